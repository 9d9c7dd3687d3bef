// Court availability finder for the PerfectMind booking portal

pub mod aggregate;
pub mod credentials;
pub mod extract;
pub mod portal;
pub mod query;
pub mod report;
pub mod session;

// Re-export key types for convenience
pub use aggregate::{
    build_grid, expand_slots, summarize, FacilityAvailability, FacilityStatus, FacilitySummary,
    SlotLink, SummaryTable, TimetableGrid,
};
pub use credentials::{Credentials, CredentialsError};
pub use extract::{ExtractionError, ScannedIds, ServiceIdExtractor, ServiceIds, ServiceSelector};
pub use portal::{AvailabilityPayload, DaySlotGroup, Facility, FacilityList, Spot};
pub use query::{run_query, QueryError, QueryRange, QueryReport};
pub use session::{ClientConfig, PortalClient, SessionClient, SessionError};
