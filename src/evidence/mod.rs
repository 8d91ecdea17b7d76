pub mod hash;
pub mod location;
pub mod manifest;
pub mod manifest_builder;
pub mod verification;

pub use hash::{sha256_hex, HashInfo};
pub use location::{LocationFix, LocationPolicy, LocationState};
pub use manifest::{ManifestLocation, ProofManifest, MANIFEST_SCHEMA_VERSION};
pub use manifest_builder::ProofManifestBuilder;
pub use verification::{
    CheckResult, VerificationChecks, VerificationReport, VerificationStatus, Verifier,
};
