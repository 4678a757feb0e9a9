pub mod connection;
pub mod engine;
pub mod error;
pub mod properties;
pub mod readonly;
pub mod settings;
pub mod telemetry;
pub mod workflow;

pub use connection::EngineConnection;
#[cfg(windows)]
pub use engine::com::ComEngineProvider;
pub use engine::sim::SimEngineProvider;
pub use engine::{AutomationEngine, EngineDocument, EngineFault, EngineProvider, PropertySet};
pub use error::CadpropError;
pub use properties::{
    CUSTOM_PROPERTY_SET, FieldName, FieldOutcome, FieldStatus, resolve_custom_properties, upsert,
};
pub use readonly::ReadOnlyGuard;
pub use settings::{Settings, TelemetrySettings};
pub use telemetry::{Heartbeat, MachineIdentity};
pub use workflow::{DocumentWriter, FieldValues, SUPPORTED_EXTENSIONS, WriteReport};
