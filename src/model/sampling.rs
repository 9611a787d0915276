//! Token selection over a single row of logits.

use std::collections::HashSet;

/// Divides positive logits and multiplies negative ones by `penalty` for every
/// token already present in `history`.
pub fn apply_repetition_penalty(logits: &mut [f32], history: &[i64], penalty: f32) {
    if penalty == 1.0 {
        return;
    }
    let seen: HashSet<usize> = history
        .iter()
        .filter_map(|&id| usize::try_from(id).ok())
        .collect();
    for id in seen {
        if let Some(logit) = logits.get_mut(id) {
            if *logit > 0.0 {
                *logit /= penalty;
            } else {
                *logit *= penalty;
            }
        }
    }
}

pub fn argmax(logits: &[f32]) -> Option<usize> {
    logits
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(idx, _)| idx)
}

/// Tokens eligible for sampling with their renormalized probabilities, most
/// likely first. `top_k == 0` disables the top-k cut.
pub fn candidates(logits: &[f32], temperature: f64, top_k: usize, top_p: f64) -> Vec<(usize, f32)> {
    let temperature = temperature.max(f64::EPSILON) as f32;
    let mut ranked: Vec<(usize, f32)> = logits
        .iter()
        .enumerate()
        .filter(|(_, logit)| logit.is_finite())
        .map(|(idx, logit)| (idx, logit / temperature))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    if top_k > 0 {
        ranked.truncate(top_k);
    }
    let Some(&(_, max)) = ranked.first() else {
        return ranked;
    };

    let mut total = 0.0f32;
    for (_, score) in ranked.iter_mut() {
        *score = (*score - max).exp();
        total += *score;
    }
    for (_, score) in ranked.iter_mut() {
        *score /= total;
    }

    if top_p < 1.0 {
        let mut cumulative = 0.0f32;
        let mut keep = ranked.len();
        for (idx, (_, p)) in ranked.iter().enumerate() {
            cumulative += p;
            if cumulative >= top_p as f32 {
                keep = idx + 1;
                break;
            }
        }
        ranked.truncate(keep);
        let total: f32 = ranked.iter().map(|(_, p)| p).sum();
        for (_, p) in ranked.iter_mut() {
            *p /= total;
        }
    }
    ranked
}

/// Picks a token given a uniform draw in `[0, 1)`.
pub fn pick(candidates: &[(usize, f32)], draw: f32) -> Option<usize> {
    let mut cumulative = 0.0f32;
    for &(idx, p) in candidates {
        cumulative += p;
        if draw < cumulative {
            return Some(idx);
        }
    }
    candidates.last().map(|&(idx, _)| idx)
}
