/*!
Resolution model, spatial indices and neighbor relations for particle based
(SPH) simulations with single or adaptive resolution.
*/

mod simulation;

pub use simulation::*;
