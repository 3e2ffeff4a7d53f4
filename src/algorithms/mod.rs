pub mod candidates;
pub mod factorization;

pub use candidates::CandidateSelector;
pub use factorization::{FactorMatrices, InteractionMatrix, LatentFactorModel};
