mod capability;
mod spacegroup;
mod template;

pub use capability::{JobState, LocalOptimizer, OptimizerKind, QueueSnapshot};
pub use spacegroup::SpacegroupProvider;
pub use template::{interpret_template, TemplateContext, ANGSTROM_TO_BOHR};
