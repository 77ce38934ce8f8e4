// fastcon: command-line front end for the Fastcon BLE mesh controller
//
// Encodes frames, simulates the transmit path and pairing sessions on a
// virtual clock, and runs the controller in real time.

mod config;
mod radio;
mod run;
mod simulate;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use fastcon_core::protocol::{
    command_advertisement, control_payload, encode_frame, AddressPrefixFramer, RfFramer,
    BROADCAST_ADDRESS,
};
use fastcon_core::{encode_light_state, CommandType, LightCommand, LightState, MeshKey, RadioEvent};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fastcon")]
#[command(about = "Fastcon: advertisement-only BLE mesh light controller", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mesh key as 8 hex characters, overriding the config file
    #[arg(long, global = true)]
    mesh_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a raw command into a frame and advertisement
    Encode {
        #[arg(long, value_parser = parse_light_id)]
        light_id: u16,
        /// Payload bytes as hex
        #[arg(long)]
        payload: String,
        /// 5 = control, 2 = pairing response
        #[arg(long, default_value = "5")]
        command_type: u8,
        #[arg(long)]
        no_forward: bool,
        #[arg(long, default_value = "0")]
        sequence: u8,
    },
    /// Encode a light state into a control frame
    Light {
        #[arg(long, value_parser = parse_light_id)]
        light_id: u16,
        #[arg(long)]
        off: bool,
        /// 0.0 - 1.0
        #[arg(long, default_value = "1.0")]
        brightness: f32,
        /// R,G,B each 0.0 - 1.0
        #[arg(long)]
        rgb: Option<String>,
        #[arg(long)]
        warm: Option<f32>,
        #[arg(long)]
        cold: Option<f32>,
        /// Color temperature in mireds
        #[arg(long)]
        mireds: Option<f32>,
        #[arg(long)]
        white: bool,
    },
    /// Simulate rapid light updates through debounce and the scheduler
    Simulate {
        #[arg(long, default_value = "3")]
        lights: u16,
        #[arg(long, default_value = "10")]
        updates: u32,
        #[arg(long, default_value = "8")]
        spacing_ms: u64,
        #[arg(long, default_value = "1000")]
        duration_ms: u64,
    },
    /// Simulate a pairing session and print every advertisement
    Pair {
        #[arg(long, value_parser = parse_light_id)]
        light_id: u16,
        #[arg(long, default_value = "1")]
        group_id: u32,
        #[arg(long, default_value = "60000")]
        duration_ms: u64,
    },
    /// Run the controller in real time, reading commands from stdin
    Run {
        #[arg(long, default_value = "5")]
        tick_ms: u64,
    },
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Create a config file for a mesh key
    Init {
        mesh_key: String,
        #[arg(long)]
        force: bool,
    },
    Show,
    Set { key: String, value: String },
    Get { key: String },
}

fn parse_light_id(value: &str) -> Result<u16, String> {
    config::parse_u16(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = config::Config::resolve(cli.config)?;
    let mesh_key = cli
        .mesh_key
        .as_deref()
        .map(MeshKey::from_hex)
        .transpose()
        .context("Invalid --mesh-key")?;

    match cli.command {
        Commands::Encode {
            light_id,
            payload,
            command_type,
            no_forward,
            sequence,
        } => {
            let key = config::Config::load_or_override(config_path, mesh_key)?.mesh_key;
            cmd_encode(key, light_id, &payload, command_type, !no_forward, sequence)
        }
        Commands::Light {
            light_id,
            off,
            brightness,
            rgb,
            warm,
            cold,
            mireds,
            white,
        } => {
            let key = config::Config::load_or_override(config_path, mesh_key)?.mesh_key;
            let state = build_light_state(off, brightness, rgb.as_deref(), warm, cold, mireds, white)?;
            cmd_light(key, light_id, &state)
        }
        Commands::Simulate {
            lights,
            updates,
            spacing_ms,
            duration_ms,
        } => {
            let controller = config::Config::load_or_override(config_path, mesh_key)?;
            let scenario = simulate::UpdateScenario {
                lights,
                updates,
                spacing_ms,
                duration_ms,
            };
            cmd_simulate(controller, &scenario)
        }
        Commands::Pair {
            light_id,
            group_id,
            duration_ms,
        } => {
            let controller = config::Config::load_or_override(config_path, mesh_key)?;
            cmd_pair(controller, light_id, group_id, duration_ms)
        }
        Commands::Run { tick_ms } => {
            let controller = config::Config::load_or_override(config_path, mesh_key)?;
            run::run(controller, tick_ms).await
        }
        Commands::Config { action } => cmd_config(config_path, action),
    }
}

fn cmd_encode(
    key: MeshKey,
    light_id: u16,
    payload: &str,
    command_type: u8,
    forward: bool,
    sequence: u8,
) -> Result<()> {
    let payload = hex::decode(payload.trim()).context("Payload must be hex")?;
    let command_type = CommandType::try_from(command_type)
        .map_err(|t| anyhow::anyhow!("Unsupported command type: {}", t))?;

    let command = LightCommand {
        light_id,
        command_type,
        payload,
        forward,
    };
    print_frame(key, &command, sequence)
}

fn build_light_state(
    off: bool,
    brightness: f32,
    rgb: Option<&str>,
    warm: Option<f32>,
    cold: Option<f32>,
    mireds: Option<f32>,
    white: bool,
) -> Result<LightState> {
    if off {
        return Ok(LightState::off());
    }

    let mut state = LightState::on(brightness);
    if let Some(rgb) = rgb {
        let channels = rgb
            .split(',')
            .map(|c| c.trim().parse::<f32>())
            .collect::<Result<Vec<_>, _>>()
            .context("RGB must be three comma-separated numbers")?;
        let &[red, green, blue] = channels.as_slice() else {
            anyhow::bail!("RGB must be three comma-separated numbers");
        };
        state = state.with_rgb(red, green, blue);
    }
    if warm.is_some() || cold.is_some() {
        state = state.with_cold_warm(cold.unwrap_or(0.0), warm.unwrap_or(0.0));
    }
    if let Some(mireds) = mireds {
        state = state.with_color_temperature(mireds);
    }
    if white {
        state = state.with_white();
    }
    Ok(state)
}

fn cmd_light(key: MeshKey, light_id: u16, state: &LightState) -> Result<()> {
    let light_data = encode_light_state(state);
    let payload = control_payload(light_id, &light_data);

    println!("{}", "Light state".bold());
    println!("  Light data:      {}", hex::encode(&light_data).bright_yellow());
    println!("  Control payload: {}", hex::encode(&payload).bright_yellow());
    println!();

    print_frame(key, &LightCommand::control(light_id, payload), 0)
}

fn print_frame(key: MeshKey, command: &LightCommand, sequence: u8) -> Result<()> {
    let frame = encode_frame(command, &key, sequence);
    let framed = AddressPrefixFramer.frame(&BROADCAST_ADDRESS, frame.as_bytes());
    let advertisement = command_advertisement(&framed)?;

    println!("{}", "Frame".bold());
    println!("  Light id:      {}", command.light_id.to_string().bright_cyan());
    println!("  Command type:  {:?}", command.command_type);
    println!("  Sequence:      {}", sequence);
    println!("  Plain:         {}", hex::encode(frame.decrypt(&key)));
    println!("  Encrypted:     {}", frame.to_hex().bright_yellow());
    println!("  Framed:        {}", hex::encode(&framed));
    println!("  Advertisement: {}", hex::encode(&advertisement).bright_green());
    Ok(())
}

fn cmd_simulate(controller: fastcon_core::ControllerConfig, scenario: &simulate::UpdateScenario) -> Result<()> {
    let report = simulate::simulate_updates(controller, scenario)?;

    println!("{}", "Radio timeline".bold());
    for (at, event) in &report.timeline {
        match event {
            RadioEvent::Configured(data) => {
                println!("  {:>6} ms  configure {}", at, hex::encode(data).bright_yellow())
            }
            RadioEvent::StartedAdvertising(_) => println!("  {:>6} ms  {}", at, "start".green()),
            RadioEvent::StoppedAdvertising => println!("  {:>6} ms  {}", at, "stop".dimmed()),
            other => println!("  {:>6} ms  {:?}", at, other),
        }
    }
    println!();
    println!("Updates staged: {}", report.updates_staged);
    println!("Frames sent:    {}", report.frames_sent.to_string().bright_cyan());
    Ok(())
}

fn cmd_pair(
    controller: fastcon_core::ControllerConfig,
    light_id: u16,
    group_id: u32,
    duration_ms: u64,
) -> Result<()> {
    let report = simulate::simulate_pairing(controller, light_id, group_id, duration_ms)?;

    println!("{}", "Pairing advertisements".bold());
    for adv in &report.advertisements {
        println!(
            "  {:>6} ms  {:<9} light {:<5} {}",
            adv.at_ms,
            format!("{:?}", adv.phase),
            adv.light_id,
            hex::encode(&adv.data).bright_yellow()
        );
    }
    println!();
    match report.finished_at {
        Some(at) => println!("{} Session ended at {} ms, scanning resumed", "✓".green(), at),
        None => println!("Session still active after {} ms", duration_ms),
    }
    Ok(())
}

fn cmd_config(path: PathBuf, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { mesh_key, force } => {
            let key = MeshKey::from_hex(&mesh_key).context("Invalid mesh key")?;
            let config = config::Config::init(path, key, force)?;
            println!("{} Wrote {}", "✓".green(), config.path().display());
        }

        ConfigAction::Show => {
            let config = config::Config::load(path)?;
            println!("{}", "Configuration".bold());
            println!("  {}", config.path().display().to_string().dimmed());
            println!();
            for (key, value) in config.list() {
                println!("  {:<26} {}", key.bright_cyan(), value);
            }
        }

        ConfigAction::Set { key, value } => {
            let mut config = config::Config::load(path)?;
            config.set(&key, &value)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            let config = config::Config::load(path)?;
            match config.get(&key) {
                Some(value) => println!("{} = {}", key.bright_cyan(), value),
                None => anyhow::bail!("Unknown config key: {}", key),
            }
        }
    }

    Ok(())
}
