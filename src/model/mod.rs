mod lifecycle;
mod model_type;
mod record;

pub use lifecycle::{Hook, LifecycleObserver};
pub use model_type::{ModelType, RecordStream};
pub use record::Record;
