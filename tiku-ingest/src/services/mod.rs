//! Service modules for the extraction engine

pub mod asset_resolver;
pub mod checkpoint_store;
pub mod driver;
pub mod extractor;
pub mod scanner;
pub mod validator;
pub mod vision_client;
pub mod voter;

pub use asset_resolver::AssetResolver;
pub use checkpoint_store::{CheckpointStore, StoreError};
pub use driver::{ConvergenceDriver, DriverConfig};
pub use extractor::{ExtractError, Extractor, RawCandidate};
pub use validator::{Normalizer, RejectReason, DEFAULT_MIN_LENGTH};
pub use vision_client::{VisionClient, VisionSettings};
pub use voter::{Consensus, ConsensusVoter, VoteOutcome};
