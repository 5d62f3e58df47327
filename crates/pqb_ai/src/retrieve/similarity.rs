use std::cmp::Ordering;

pub fn l2_norm(v: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for x in v {
        sum += x * x;
    }
    sum.sqrt()
}

/// Cosine similarity given precomputed norms; a zero-norm side scores 0.
pub fn cosine_similarity(a: &[f32], b: &[f32], a_norm: f32, b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let mut dot = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
    }
    dot / (a_norm * b_norm)
}

/// Score descending, then chunk id ascending.
pub fn rank_order(a: &(String, f32), b: &(String, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_and_orthogonal_vectors() {
        let a = [1.0, 0.0];
        let b = [2.0, 0.0];
        let c = [0.0, 3.0];
        assert!((cosine_similarity(&a, &b, l2_norm(&a), l2_norm(&b)) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &c, l2_norm(&a), l2_norm(&c)), 0.0);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0], 1.0, 0.0), 0.0);
    }

    #[test]
    fn ties_break_on_chunk_id() {
        let mut hits = vec![
            ("b_chunk_0001".to_string(), 0.5),
            ("a_chunk_0003".to_string(), 0.5),
            ("c_chunk_0000".to_string(), 0.9),
        ];
        hits.sort_by(rank_order);
        let ids: Vec<&str> = hits.iter().map(|h| h.0.as_str()).collect();
        assert_eq!(ids, vec!["c_chunk_0000", "a_chunk_0003", "b_chunk_0001"]);
    }
}
