// Real-time controller loop.
//
// A tokio interval drives `tick()` on the wall clock while stdin feeds the
// command surface. The radio only logs, so this is safe to run anywhere.

use crate::config::parse_u16;
use crate::radio::LoggingRadio;
use anyhow::{Context, Result};
use colored::*;
use fastcon_core::{
    ControllerConfig, ControllerMode, FastconController, LightState, SystemClock, DEFAULT_GROUP_ID,
};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

type Controller = FastconController<LoggingRadio, SystemClock>;

#[derive(Debug, Clone, PartialEq)]
pub enum LoopCommand {
    Raw { light_id: u16, payload: Vec<u8> },
    Reset { light_id: u16 },
    On { light_id: u16, brightness: f32 },
    Off { light_id: u16 },
    Pair { light_id: u16, group_id: u32 },
    Cancel,
    Clear,
    Status,
    Quit,
}

pub fn parse_command(line: &str) -> Result<LoopCommand> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let light_id = |i: usize| -> Result<u16> {
        let value = parts.get(i).context("Missing light id")?;
        parse_u16(value).with_context(|| format!("Invalid light id: {}", value))
    };

    let command = match parts.first().copied() {
        Some("raw") => LoopCommand::Raw {
            light_id: light_id(1)?,
            payload: hex::decode(parts.get(2).context("Missing payload")?)
                .context("Payload must be hex")?,
        },
        Some("reset") => LoopCommand::Reset {
            light_id: light_id(1)?,
        },
        Some("on") => LoopCommand::On {
            light_id: light_id(1)?,
            brightness: match parts.get(2) {
                Some(value) => value.parse().context("Invalid brightness")?,
                None => 1.0,
            },
        },
        Some("off") => LoopCommand::Off {
            light_id: light_id(1)?,
        },
        Some("pair") => LoopCommand::Pair {
            light_id: light_id(1)?,
            group_id: match parts.get(2) {
                Some(value) => value.parse().context("Invalid group id")?,
                None => DEFAULT_GROUP_ID,
            },
        },
        Some("cancel") => LoopCommand::Cancel,
        Some("clear") => LoopCommand::Clear,
        Some("status") => LoopCommand::Status,
        Some("quit") | Some("exit") => LoopCommand::Quit,
        Some(other) => anyhow::bail!("Unknown command: {}", other),
        None => anyhow::bail!("Empty command"),
    };
    Ok(command)
}

fn execute(controller: &Controller, command: LoopCommand) -> Result<()> {
    match command {
        LoopCommand::Raw { light_id, payload } => {
            controller.queue_raw_command(light_id, &payload)?;
            println!("{} Queued raw command for light {}", "✓".green(), light_id);
        }
        LoopCommand::Reset { light_id } => {
            controller.factory_reset_device(light_id)?;
            println!("{} Queued factory reset for light {}", "✓".green(), light_id);
        }
        LoopCommand::On { light_id, brightness } => {
            controller.update_light_state(light_id, &LightState::on(brightness));
        }
        LoopCommand::Off { light_id } => {
            controller.update_light_state(light_id, &LightState::off());
        }
        LoopCommand::Pair { light_id, group_id } => {
            controller.pair_device(light_id, group_id);
            println!(
                "{} Pairing light {} for 60 s, put the bulb in pairing mode",
                "✓".green(),
                light_id
            );
        }
        LoopCommand::Cancel => {
            if controller.cancel_pairing() {
                println!("{} Pairing cancelled", "✓".green());
            } else {
                println!("Not pairing.");
            }
        }
        LoopCommand::Clear => {
            let dropped = controller.clear_queue();
            println!("{} Dropped {} queued commands", "✓".green(), dropped);
        }
        LoopCommand::Status => {
            let status = controller.status();
            let (advertisements, scanning) =
                controller.with_radio(|radio| (radio.advertisements(), radio.is_scanning()));
            let mode = match status.mode {
                ControllerMode::Normal => "normal".bright_green(),
                ControllerMode::Pairing => "pairing".bright_yellow(),
            };
            println!("Mode:       {}", mode);
            println!("Scheduler:  {:?}", status.schedule_state);
            println!("Queue:      {}/{}", status.queue_size, status.queue_capacity);
            println!("Pending:    {}", status.pending_updates);
            println!("Frames:     {}", status.frames_sent);
            println!("Radio:      {} advertisements, scanning {}", advertisements, scanning);
            if let (Some(phase), Some(light_id)) = (status.pairing_phase, status.pairing_light_id) {
                println!(
                    "Pairing:    {:?} light {} ({} ms)",
                    phase,
                    light_id,
                    status.pairing_elapsed_ms.unwrap_or_default()
                );
            }
        }
        LoopCommand::Quit => {}
    }
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

pub async fn run(config: ControllerConfig, tick_ms: u64) -> Result<()> {
    let controller: Controller = FastconController::new(config, LoggingRadio::new(), SystemClock::new())
        .context("Failed to start controller")?;
    controller.setup();

    println!("{}", "Fastcon controller running".bold());
    println!();
    println!("{}", "Commands:".bold());
    println!("  {} <id> <hex>", "raw".bright_green());
    println!("  {} <id>", "reset".bright_green());
    println!("  {} <id> [brightness]", "on".bright_green());
    println!("  {} <id>", "off".bright_green());
    println!("  {} <id> [group]", "pair".bright_green());
    println!("  {}", "cancel".bright_green());
    println!("  {}", "clear".bright_green());
    println!("  {}", "status".bright_green());
    println!("  {}", "quit".bright_green());
    println!();

    let ticker = controller.clone();
    let tick_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            ticker.tick();
        }
    });

    let stdin_task = tokio::spawn(async move {
        use tokio::io::AsyncBufReadExt;

        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        prompt();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                prompt();
                continue;
            }

            match parse_command(line) {
                Ok(LoopCommand::Quit) => {
                    println!("Shutting down...");
                    break;
                }
                Ok(command) => {
                    if let Err(e) = execute(&controller, command) {
                        println!("{} {:#}", "✗".red(), e);
                    }
                }
                Err(e) => println!("{} {:#}", "✗".red(), e),
            }
            prompt();
        }
    });

    tokio::select! {
        _ = tick_task => {}
        _ = stdin_task => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("raw 5 0a0b").unwrap(),
            LoopCommand::Raw {
                light_id: 5,
                payload: vec![0x0A, 0x0B]
            }
        );
        assert_eq!(parse_command("reset 0x10").unwrap(), LoopCommand::Reset { light_id: 16 });
        assert_eq!(
            parse_command("pair 7").unwrap(),
            LoopCommand::Pair {
                light_id: 7,
                group_id: DEFAULT_GROUP_ID
            }
        );
        assert_eq!(
            parse_command("on 3 0.5").unwrap(),
            LoopCommand::On {
                light_id: 3,
                brightness: 0.5
            }
        );
        assert_eq!(parse_command("exit").unwrap(), LoopCommand::Quit);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_command("raw 5").is_err());
        assert!(parse_command("raw 5 zz").is_err());
        assert!(parse_command("reset").is_err());
        assert!(parse_command("dance").is_err());
    }
}
