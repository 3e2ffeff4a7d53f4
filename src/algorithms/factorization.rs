//! Per-request latent factor model.
//!
//! Interaction history for the requesting user and the candidate posts is staged,
//! turned into a dense user x post strength matrix and decomposed with a truncated
//! SVD. Nothing here outlives the request that built it.

use crate::error::{FeedError, Result};
use crate::models::*;
use crate::services::store::InteractionStore;
use crate::utils::working_set_fingerprint;
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Relative tolerance under which singular values and scores count as zero.
const ZERO_TOLERANCE: f64 = 1e-9;
const SVD_MAX_ITERATIONS: usize = 10_000;

/// Dense user x post strength matrix for one working set.
#[derive(Debug, Clone)]
pub struct InteractionMatrix {
    users: Vec<UserId>,
    posts: Vec<PostId>,
    values: DMatrix<f64>,
}

impl InteractionMatrix {
    /// Row 0 is always `user_id`; remaining rows follow ascending user id.
    /// Cells for posts outside `candidates` are dropped.
    pub fn build(
        user_id: UserId,
        candidates: &[PostId],
        cells: &BTreeMap<(UserId, PostId), f64>,
    ) -> Result<Self> {
        let mut posts = Vec::with_capacity(candidates.len());
        let mut columns = HashMap::with_capacity(candidates.len());
        for &post_id in candidates {
            if !columns.contains_key(&post_id) {
                columns.insert(post_id, posts.len());
                posts.push(post_id);
            }
        }

        let others: BTreeSet<UserId> = cells
            .keys()
            .map(|(user, _)| *user)
            .filter(|user| *user != user_id)
            .collect();
        let mut users = Vec::with_capacity(others.len() + 1);
        users.push(user_id);
        users.extend(others);
        let rows: HashMap<UserId, usize> = users.iter().enumerate().map(|(i, u)| (*u, i)).collect();

        let mut values = DMatrix::<f64>::zeros(users.len(), posts.len());
        for (&(user, post), &strength) in cells {
            if let (Some(&row), Some(&col)) = (rows.get(&user), columns.get(&post)) {
                values[(row, col)] = strength;
            }
        }

        if values.iter().any(|v| !v.is_finite()) {
            return Err(FeedError::Ranking(
                "interaction matrix contains non-finite strengths".to_string(),
            ));
        }

        Ok(Self {
            users,
            posts,
            values,
        })
    }

    pub fn users(&self) -> &[UserId] {
        &self.users
    }

    pub fn posts(&self) -> &[PostId] {
        &self.posts
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.shape()
    }

    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| *v == 0.0)
    }
}

/// Rank-k factors of an interaction matrix. Singular values are split evenly
/// between the two sides, so `user_factors * item_factors^T` is the rank-k
/// approximation of the input.
#[derive(Debug, Clone)]
pub struct FactorMatrices {
    pub user_factors: DMatrix<f64>,
    pub item_factors: DMatrix<f64>,
    /// Largest singular value, zero for an all-zero input.
    pub scale: f64,
}

impl FactorMatrices {
    /// Effective rank is `min(k, rows, cols, non-zero singular values)`.
    pub fn decompose(matrix: &DMatrix<f64>, k: usize) -> Result<Self> {
        let (rows, cols) = matrix.shape();
        let svd = matrix
            .clone()
            .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
            .ok_or_else(|| FeedError::Ranking("SVD did not converge".to_string()))?;
        let u = svd
            .u
            .ok_or_else(|| FeedError::Ranking("SVD failed to compute U".to_string()))?;
        let v_t = svd
            .v_t
            .ok_or_else(|| FeedError::Ranking("SVD failed to compute V^T".to_string()))?;
        let sigma = svd.singular_values;

        let mut order: Vec<usize> = (0..sigma.len()).collect();
        order.sort_by(|&a, &b| sigma[b].partial_cmp(&sigma[a]).unwrap_or(std::cmp::Ordering::Equal));

        let scale = order.first().map(|&i| sigma[i]).unwrap_or(0.0);
        let cutoff = scale * ZERO_TOLERANCE;
        let usable = order.iter().take_while(|&&i| sigma[i] > cutoff).count();
        let rank = k.min(rows).min(cols).min(usable);
        order.truncate(rank);

        let user_factors =
            DMatrix::from_fn(rows, rank, |i, c| u[(i, order[c])] * sigma[order[c]].sqrt());
        let item_factors =
            DMatrix::from_fn(cols, rank, |j, c| v_t[(order[c], j)] * sigma[order[c]].sqrt());

        Ok(Self {
            user_factors,
            item_factors,
            scale,
        })
    }

    pub fn rank(&self) -> usize {
        self.user_factors.ncols()
    }

    /// Inner product of a user row and an item row.
    pub fn affinity(&self, user_row: usize, item_row: usize) -> f64 {
        if self.rank() == 0 {
            return 0.0;
        }
        let score = self.user_factors.row(user_row).dot(&self.item_factors.row(item_row));
        snap(score, self.scale * ZERO_TOLERANCE)
    }
}

/// Rounds away numerical noise so exact ties stay ties. Adding 0.0 clears -0.0.
fn snap(score: f64, tolerance: f64) -> f64 {
    if tolerance <= 0.0 {
        return score + 0.0;
    }
    (score / tolerance).round() * tolerance + 0.0
}

/// Collaborative-filtering model servicing a single feed request.
pub struct LatentFactorModel {
    store: Arc<dyn InteractionStore>,
    /// Aggregated strength per (user, post), summed in f64 so large weights cannot overflow.
    cells: BTreeMap<(UserId, PostId), f64>,
}

impl LatentFactorModel {
    pub fn new(store: Arc<dyn InteractionStore>) -> Self {
        Self {
            store,
            cells: BTreeMap::new(),
        }
    }

    pub async fn load_users(&mut self, user_ids: &[UserId]) -> Result<()> {
        let records = self.store.fetch_user_interactions(user_ids).await?;
        debug!("Loaded {} interactions for {} users", records.len(), user_ids.len());
        self.stage(&records);
        Ok(())
    }

    pub async fn load_items(&mut self, post_ids: &[PostId]) -> Result<()> {
        let records = self.store.fetch_post_interactions(post_ids).await?;
        debug!("Loaded {} interactions for {} posts", records.len(), post_ids.len());
        self.stage(&records);
        Ok(())
    }

    /// Each load returns every record for the pairs it covers, so a pair that
    /// was already staged by another load already holds its full strength.
    fn stage(&mut self, records: &[InteractionRecord]) {
        let mut batch: BTreeMap<(UserId, PostId), f64> = BTreeMap::new();
        for record in records {
            *batch.entry((record.user_id, record.post_id)).or_insert(0.0) += record.weight as f64;
        }
        for (pair, strength) in batch {
            self.cells.entry(pair).or_insert(strength);
        }
    }

    pub fn staged_cells(&self) -> usize {
        self.cells.len()
    }

    /// Cache key for ranking `candidates` for `user_id` against the staged data.
    pub fn working_set_key(&self, user_id: UserId, k: usize, candidates: &[PostId]) -> u64 {
        let cells: Vec<((UserId, PostId), f64)> = self.cells.iter().map(|(p, s)| (*p, *s)).collect();
        working_set_fingerprint(user_id, k, candidates, &cells)
    }

    /// Predicted affinity of `user_id` for each candidate, in candidate order.
    /// An empty candidate list yields an empty result.
    pub fn rank(&self, user_id: UserId, k: usize, candidates: &[PostId]) -> Result<Vec<(PostId, f64)>> {
        match self.score(user_id, k, candidates) {
            Err(FeedError::ModelInput(reason)) => {
                debug!("Nothing to rank for user {}: {}", user_id, reason);
                Ok(Vec::new())
            }
            other => other,
        }
    }

    fn score(&self, user_id: UserId, k: usize, candidates: &[PostId]) -> Result<Vec<(PostId, f64)>> {
        if candidates.is_empty() {
            return Err(FeedError::ModelInput("candidate set is empty".to_string()));
        }

        let matrix = InteractionMatrix::build(user_id, candidates, &self.cells)?;
        let (rows, cols) = matrix.shape();

        if matrix.is_zero() {
            debug!("Interaction matrix {}x{} is empty, keeping candidate order", rows, cols);
            return Ok(matrix.posts().iter().map(|&p| (p, 0.0)).collect());
        }

        let factors = FactorMatrices::decompose(matrix.values(), k)?;
        debug!(
            "Factorized {}x{} interaction matrix at rank {} (requested {})",
            rows,
            cols,
            factors.rank(),
            k
        );

        let scores: Vec<f64> = (0..cols)
            .into_par_iter()
            .map(|col| factors.affinity(0, col))
            .collect();

        if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
            return Err(FeedError::Ranking(format!("non-finite affinity score {}", bad)));
        }

        Ok(matrix.posts().iter().copied().zip(scores).collect())
    }
}
