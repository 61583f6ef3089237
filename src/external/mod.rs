pub mod mock;
pub mod traits;

pub use traits::{
    service_ids, ActionEngine, ComponentCatalog, LoadPipeRequest, LoadPipeResponse, PipeCatalog,
    ResourceRegistrar, ResourceStatus, SyncChannel, TaskDescriptor, TrackObjectRequest,
    TrackObjectResponse,
};
