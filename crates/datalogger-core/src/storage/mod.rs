pub mod flash;
pub mod offload;
pub mod ring;

pub use flash::{DEFAULT_DIE_SIZE, Die, FlashDevice, FlashError, ProgramModel, RamFlash};
pub use offload::{OffloadEngine, OffloadReport, WriteFailurePolicy};
pub use ring::{FlashRingStore, StorageCursor, StorageError};
