mod check;
mod operators;
mod random;

pub use check::{check_crystal, CellLimits, ParamRange};
pub use operators::{crossover, exchange, permustrain, ripple, strain, stripple};
pub use random::random_crystal;
