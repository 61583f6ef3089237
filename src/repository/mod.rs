pub mod item;
pub mod store;

pub use item::{
    ComponentPayload, Item, ItemKind, ItemPayload, MapPayload, ObjectPayload, Pose, RobotPayload,
};
pub use store::Repository;
