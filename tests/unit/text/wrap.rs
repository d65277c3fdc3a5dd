use super::*;

// One unit per character keeps widths easy to reason about.
fn mono(s: &str) -> f32 {
    s.chars().count() as f32
}

#[test]
fn greedy_fill_up_to_max_width() {
    let lines = wrap_words("the quick brown fox jumps", 10.0, mono);
    assert_eq!(lines, vec!["the quick", "brown fox", "jumps"]);
    for l in &lines {
        assert!(mono(l) <= 10.0);
    }
}

#[test]
fn long_word_sits_alone_and_is_never_split() {
    let text = "a supercalifragilistic b";
    let lines = wrap_words(text, 5.0, mono);
    assert_eq!(lines, vec!["a", "supercalifragilistic", "b"]);

    let rejoined: Vec<&str> = lines.iter().flat_map(|l| l.split(' ')).collect();
    let original: Vec<&str> = text.split_whitespace().collect();
    assert_eq!(rejoined, original);
}

#[test]
fn whitespace_is_collapsed() {
    assert_eq!(wrap_words("  a \n b\t c ", 100.0, mono), vec!["a b c"]);
    assert!(wrap_words("   ", 100.0, mono).is_empty());
}

#[test]
fn cache_hit_returns_same_allocation() {
    let mut cache = CaptionLayoutCache::default();
    let a = cache.wrap("hello world again", 11.0, mono).unwrap();
    let mut calls = 0;
    let b = cache
        .wrap("hello world again", 11.0, |s| {
            calls += 1;
            mono(s)
        })
        .unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(calls, 0);
    assert_eq!(cache.stats().hits, 1);
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn empty_text_yields_empty_lines_without_caching() {
    let mut cache = CaptionLayoutCache::default();
    assert!(cache.wrap("", 10.0, mono).unwrap().is_empty());
    assert!(cache.is_empty());
}

#[test]
fn invalid_width_is_rejected() {
    let mut cache = CaptionLayoutCache::default();
    assert!(cache.wrap("x", 0.0, mono).is_err());
    assert!(cache.wrap("x", f32::NAN, mono).is_err());
}

#[test]
fn fifo_eviction_past_capacity() {
    let mut cache = CaptionLayoutCache::new(50);
    for i in 0..51 {
        cache.wrap(&format!("caption {i}"), 100.0, mono).unwrap();
    }
    assert_eq!(cache.len(), 50);
    assert!(!cache.contains("caption 0", 100.0));
    assert!(cache.contains("caption 1", 100.0));
    assert!(cache.contains("caption 50", 100.0));
    assert_eq!(cache.stats().evictions, 1);
}

#[test]
fn earlier_entries_are_not_mutated_by_later_inserts() {
    let mut cache = CaptionLayoutCache::new(2);
    let first = cache.wrap("one two three", 7.0, mono).unwrap();
    let snapshot: Vec<String> = first.to_vec();
    cache.wrap("four five", 7.0, mono).unwrap();
    cache.wrap("six", 7.0, mono).unwrap();
    assert_eq!(first.to_vec(), snapshot);
}

#[test]
fn width_band_change_invalidates() {
    let mut cache = CaptionLayoutCache::default();
    cache.wrap("a b c", 3.0, mono).unwrap();
    cache.wrap("d e f", 3.0, mono).unwrap();
    assert_eq!(cache.len(), 2);

    cache.wrap("a b c", 5.0, mono).unwrap();
    assert_eq!(cache.len(), 1);
    assert!(!cache.contains("d e f", 3.0));
    assert_eq!(cache.width_band(), Some(5.0));
    assert_eq!(cache.stats().invalidations, 1);

    cache.set_width_band(9.0);
    assert!(cache.is_empty());
}
