pub mod device;

pub use device::{
    CatalogEntry, CommandStatus, DeviceId, DeviceKind, DeviceSnapshot, LifecycleState,
};
