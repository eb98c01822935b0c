// ドメインモデル（エンティティと値オブジェクト）

mod value_objects;
mod inventory;
mod hold;

pub use value_objects::{
    UnitId, HoldId, ActorId,
    SessionRef,
    Role, Actor,
    UnitKind,
    RentalPeriod,
    HoldStatus,
    CancelReason,
};

pub use inventory::{InventoryUnit, CapacityRestore};
pub use hold::Hold;
