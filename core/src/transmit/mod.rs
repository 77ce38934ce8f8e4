/// Outbound transmission path
///
/// - **debounce**: per-light staging that coalesces rapid state updates
/// - **queue**: bounded FIFO of framed commands awaiting the radio
/// - **scheduler**: advertise / gap duty cycle draining the queue

pub mod debounce;
pub mod queue;
pub mod scheduler;

pub use debounce::{DebounceConfig, DebounceLayer, LightDebounceState};
pub use queue::{CommandQueue, QueueEntry, QueueError, DEFAULT_MAX_QUEUE_SIZE, MAX_RETRIES};
pub use scheduler::{ScheduleState, SchedulerTiming, TransmissionScheduler};
