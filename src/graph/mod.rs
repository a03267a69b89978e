//! Multi-axis relation discovery, lineage tracing, and knowledge-quality
//! scanning over the memory graph.

pub mod curiosity;
pub mod explore;
pub mod lineage;
