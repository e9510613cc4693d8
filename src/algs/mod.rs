//! Communication algorithms: the point-to-point façade, the all-gather used
//! by directory rebuilds, and the halo-exchange engine.

pub mod communicator;
pub mod gather;
pub mod halo;
