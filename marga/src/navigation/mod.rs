//! Guided navigation: phases, events, deviation and recovery.

mod deviation;
mod events;
mod instruction;
mod machine;
mod recovery;
mod state;
mod voice;

pub use deviation::DeviationDetector;
pub use events::{EventSink, NavEvent, NullSink};
pub use instruction::instruction_for;
pub use machine::NavigationStateMachine;
pub use recovery::{MANUAL_CAPTURE_FRAMES, RecoveryOutcome, RecoveryTracker};
pub use state::{NavPhase, NavigationInstruction, SharedNavStatus};
pub use voice::{Speaker, VoiceChannel, VoiceSink, announcement};
