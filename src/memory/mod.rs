pub mod links;
pub mod recall;
pub mod stats;
pub mod store;
pub mod types;

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

/// Convert raw little-endian bytes back to an f32 embedding.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Cosine similarity between two vectors. Zero-norm inputs score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// For L2-normalized vectors, convert a cosine-similarity threshold to the
/// equivalent sqlite-vec L2 distance bound: `d = sqrt(2·(1 − cos))`.
pub fn cosine_threshold_to_l2(cosine_threshold: f64) -> f64 {
    (2.0 * (1.0 - cosine_threshold)).max(0.0).sqrt()
}

/// For L2-normalized vectors, convert a sqlite-vec L2 distance back to
/// cosine similarity: `cos = 1 − d²/2`.
pub fn l2_to_cosine(distance: f64) -> f64 {
    1.0 - (distance * distance) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_bytes_round_trip() {
        let v = vec![0.25f32, -1.5, 3.0];
        let bytes = embedding_to_bytes(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_embedding(bytes), v);
    }

    #[test]
    fn cosine_of_identical_unit_vectors_is_one() {
        let mut v = vec![0.0f32; 384];
        v[7] = 1.0;
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        let mut a = vec![0.0f32; 384];
        let mut b = vec![0.0f32; 384];
        a[0] = 1.0;
        b[100] = 1.0;
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        let zero = vec![0.0f32; 4];
        let unit = vec![1.0f32, 0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&zero, &unit), 0.0);
    }

    #[test]
    fn threshold_conversion_round_trips() {
        for cos in [0.0, 0.5, 0.7, 0.92, 0.95, 1.0] {
            let d = cosine_threshold_to_l2(cos);
            assert!((l2_to_cosine(d) - cos).abs() < 1e-9, "cos={cos}");
        }
    }
}
