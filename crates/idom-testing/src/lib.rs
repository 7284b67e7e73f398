//! Testing utilities and harness for the idom runtime

pub mod recording;
pub mod testing;

pub use recording::{LogEvent, PatchCall, RecordingLogger, RecordingPatcher};
pub use testing::*;

pub mod prelude {
    pub use crate::recording::*;
    pub use crate::testing::*;
}
