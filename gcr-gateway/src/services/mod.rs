//! Provider-facing services
//!
//! - `transport`: retrying HTTP client shared by every provider
//! - `apibox_client` / `aiml_client`: one [`Provider`](crate::types::Provider)
//!   implementation per external API, selected by configuration
//! - `reference_lookup`: reference asset resolution for dispatch
//! - `generation_service`: dispatch + wait + callback intake behind one handle

pub mod aiml_client;
pub mod apibox_client;
pub mod generation_service;
pub mod reference_lookup;
pub mod transport;

pub use aiml_client::AimlClient;
pub use apibox_client::ApiboxClient;
pub use generation_service::{GenerationOutcome, GenerationService};
pub use reference_lookup::{ReferenceAssetLookup, StaticReferenceAsset};
pub use transport::{RetryPolicy, RetryingClient, TransportError};
