//! Deterministic "pick of the day" selection.
//!
//! Every item gets a SHA-256 derived rank seeded by the UTC day, the viewer,
//! the game and a display category. Sorting by that rank is a shuffle that is
//! stable for a whole calendar day and rotates at midnight UTC, with no stored
//! state: the pick is recomputed from the full cached pool on every read.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::HashSet;

use crate::database_ops::media_cache::MediaItem;

/// Featured video slot on a game card.
pub const VIDEO_DAILY: &str = "V-DAILY";
/// Photo strip on a game card.
pub const PHOTO_DAILY: &str = "P-DAILY";
/// Per-platform ribbon; picked with game id 0.
pub const SYSTEM_RIBBON: &str = "SYS";
/// Cross-game mixes over all ranked games; picked with game id 0.
pub const PHOTO_MIX: &str = "P-MIX-EXT";
pub const VIDEO_MIX: &str = "V-MIX-EXT";

/// Content identity used for hashing and de-duplication.
pub trait DailyPick {
    fn pick_key(&self) -> Cow<'_, str>;
}

impl DailyPick for MediaItem {
    fn pick_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.canonical_url.as_str())
    }
}

impl DailyPick for String {
    fn pick_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.as_str())
    }
}

impl DailyPick for &str {
    fn pick_key(&self) -> Cow<'_, str> {
        Cow::Borrowed(*self)
    }
}

pub fn day_seed(day: NaiveDate, user_id: i64, game_id: i64, category: &str) -> String {
    format!("{}:{}:{}:{}", day.format("%Y-%m-%d"), user_id, game_id, category)
}

/// First 8 bytes (big endian) of `sha256("{seed}:{key}")`.
pub fn daily_rank(seed: &str, key: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b":");
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Up to `n` distinct items in daily order. Items sharing a pick key are
/// collapsed (first occurrence wins) before ranking, so the result never
/// contains duplicates; when `n` exceeds the pool the whole pool comes back
/// in daily order.
pub fn pick_daily<T: DailyPick>(
    items: Vec<T>,
    day: NaiveDate,
    user_id: i64,
    game_id: i64,
    category: &str,
    n: usize,
) -> Vec<T> {
    if items.is_empty() || n == 0 {
        return Vec::new();
    }
    let seed = day_seed(day, user_id, game_id, category);
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    let mut ranked: Vec<(u64, String, T)> = Vec::with_capacity(items.len());
    for item in items {
        let key = item.pick_key().into_owned();
        if !seen.insert(key.clone()) {
            continue;
        }
        ranked.push((daily_rank(&seed, &key), key, item));
    }
    ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    ranked.truncate(n);
    ranked.into_iter().map(|(_, _, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const POOL: [&str; 5] = ["A", "B", "C", "D", "E"];

    #[test]
    fn same_day_same_inputs_same_order() {
        let a = pick_daily(POOL.to_vec(), day(2024, 1, 1), 7, 42, VIDEO_DAILY, 3);
        let b = pick_daily(POOL.to_vec(), day(2024, 1, 1), 7, 42, VIDEO_DAILY, 3);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn input_order_does_not_matter() {
        let mut reversed = POOL.to_vec();
        reversed.reverse();
        let a = pick_daily(POOL.to_vec(), day(2024, 1, 1), 7, 42, VIDEO_DAILY, 5);
        let b = pick_daily(reversed, day(2024, 1, 1), 7, 42, VIDEO_DAILY, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn scenario_rotates_on_next_day() {
        let day1 = pick_daily(POOL.to_vec(), day(2024, 1, 1), 7, 42, VIDEO_DAILY, 3);
        let day2 = pick_daily(POOL.to_vec(), day(2024, 1, 2), 7, 42, VIDEO_DAILY, 3);
        assert_eq!(day1, vec!["E", "D", "C"]);
        assert_eq!(day2, vec!["D", "A", "C"]);
        assert_ne!(day1, day2);
    }

    #[test]
    fn returns_exactly_n_distinct_or_whole_pool() {
        for n in 0..=7 {
            let got = pick_daily(POOL.to_vec(), day(2024, 6, 30), 3, 9, PHOTO_DAILY, n);
            assert_eq!(got.len(), n.min(POOL.len()));
            let distinct: HashSet<&str> = got.iter().copied().collect();
            assert_eq!(distinct.len(), got.len());
        }
    }

    #[test]
    fn duplicates_in_pool_are_collapsed() {
        let pool = vec!["A", "A", "B", "B", "C"];
        let got = pick_daily(pool, day(2024, 1, 1), 1, 1, VIDEO_DAILY, 5);
        assert_eq!(got.len(), 3);
    }

    #[test]
    fn seed_parts_each_change_the_rank() {
        let base = daily_rank(&day_seed(day(2024, 1, 1), 7, 42, VIDEO_DAILY), "A");
        assert_ne!(base, daily_rank(&day_seed(day(2024, 1, 2), 7, 42, VIDEO_DAILY), "A"));
        assert_ne!(base, daily_rank(&day_seed(day(2024, 1, 1), 8, 42, VIDEO_DAILY), "A"));
        assert_ne!(base, daily_rank(&day_seed(day(2024, 1, 1), 7, 43, VIDEO_DAILY), "A"));
        assert_ne!(base, daily_rank(&day_seed(day(2024, 1, 1), 7, 42, PHOTO_DAILY), "A"));
    }

    #[test]
    fn empty_pool_is_valid() {
        let got: Vec<String> = pick_daily(Vec::new(), day(2024, 1, 1), 7, 42, VIDEO_DAILY, 3);
        assert!(got.is_empty());
    }
}
