use crate::models::*;
use anyhow::{anyhow, Result};

pub fn validate_interaction(record: &InteractionRecord) -> Result<()> {
    if record.user_id < 0 {
        return Err(anyhow!("User ID cannot be negative: {}", record.user_id));
    }

    if record.post_id < 0 {
        return Err(anyhow!("Post ID cannot be negative: {}", record.post_id));
    }

    if !record.weight.is_finite() {
        return Err(anyhow!("Interaction weight contains invalid values (NaN or Infinity)"));
    }

    if record.weight < 0.0 {
        return Err(anyhow!("Interaction weight cannot be negative: {}", record.weight));
    }

    Ok(())
}

/// Clamps a caller supplied limit; anything at or below zero means "show nothing".
pub fn normalize_limit(limit: i64, max_limit: usize) -> usize {
    if limit <= 0 {
        0
    } else {
        (limit as u64).min(max_limit as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_interaction() {
        assert!(validate_interaction(&InteractionRecord::new(1, 2, 1.0)).is_ok());
        assert!(validate_interaction(&InteractionRecord::new(1, 2, 0.0)).is_ok());
        assert!(validate_interaction(&InteractionRecord::new(-1, 2, 1.0)).is_err());
        assert!(validate_interaction(&InteractionRecord::new(1, -2, 1.0)).is_err());
        assert!(validate_interaction(&InteractionRecord::new(1, 2, -0.5)).is_err());
        assert!(validate_interaction(&InteractionRecord::new(1, 2, f32::INFINITY)).is_err());
    }

    #[test]
    fn test_normalize_limit() {
        assert_eq!(normalize_limit(-3, 100), 0);
        assert_eq!(normalize_limit(0, 100), 0);
        assert_eq!(normalize_limit(25, 100), 25);
        assert_eq!(normalize_limit(5000, 100), 100);
    }
}
