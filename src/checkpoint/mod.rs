mod record;
mod store;

pub use record::{Checkpoint, ComponentKind, RecordValue, Records};
pub use store::CheckpointStore;
