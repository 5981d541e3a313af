use serde::Serialize;
use std::collections::HashMap;

pub const UNKNOWN_COUNTRY: &str = "Unknown Location";
pub const UNKNOWN_DEVICE: &str = "Unknown";
pub const OTHERS: &str = "Others";

const MAX_SHARES: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub percentage: i64,
}

/// Percentage share of each distinct category, largest first.
///
/// Blank or missing values count as `placeholder`. Ties keep the order in
/// which categories were first seen. When there are more than five
/// categories the top four are kept and the rest are summed into `Others`.
/// Each share is rounded on its own, so totals can drift from 100. `Others`
/// is the sum of the rounded tail shares, capped at what the top four leave
/// of 100; a long tail of half-percent categories would otherwise round up
/// past 100.
pub fn rollup<'a, I>(categories: I, placeholder: &str) -> Vec<CategoryShare>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, i64)> = Vec::new();
    let mut total = 0i64;

    for value in categories {
        let key = match value.map(str::trim) {
            Some(v) if !v.is_empty() => v,
            _ => placeholder,
        };
        total += 1;
        match index.get(key) {
            Some(&idx) => counts[idx].1 += 1,
            None => {
                index.insert(key.to_string(), counts.len());
                counts.push((key.to_string(), 1));
            }
        }
    }

    if total == 0 {
        return Vec::new();
    }

    let mut shares: Vec<CategoryShare> = counts
        .into_iter()
        .map(|(category, count)| CategoryShare {
            category,
            percentage: percent_of(count, total),
        })
        .collect();
    shares.sort_by(|a, b| b.percentage.cmp(&a.percentage));

    if shares.len() > MAX_SHARES {
        let kept: i64 = shares[..MAX_SHARES - 1].iter().map(|s| s.percentage).sum();
        let others: i64 = shares[MAX_SHARES - 1..].iter().map(|s| s.percentage).sum();
        let others = others.min((100 - kept).max(0));
        shares.truncate(MAX_SHARES - 1);
        shares.push(CategoryShare {
            category: OTHERS.to_string(),
            percentage: others,
        });
    }
    shares
}

/// `round(count / total * 100)` with halves rounded up.
fn percent_of(count: i64, total: i64) -> i64 {
    (200 * count + total) / (2 * total)
}
