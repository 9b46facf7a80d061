pub mod collect;
pub mod compile;
pub mod order;
pub mod program;
pub mod reduce;
pub mod transform;
