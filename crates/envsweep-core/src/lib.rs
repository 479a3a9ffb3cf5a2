mod classify;
mod package;
mod policy;
mod requirements;

pub use classify::{classify, Classification, ClassifyReport};
pub use package::{normalize_name, PackageRecord, PackageSet};
pub use policy::{PolicyOverlay, RetentionPolicy};
pub use requirements::{load_requirements, parse_requirements_str, DeclaredDependencySet};
