pub mod decision;
pub mod execution;
pub mod product;
pub mod report;
