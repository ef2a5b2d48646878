//! Router behaviour over longer navigation sequences.

use farmshield_core::{AddressObserver, MemoryHistory, NavigationRouter, ViewTag};
use std::sync::Arc;

const TAGS: [&str; 8] = ["dashboard", "crops", "pest", "bot", "mandi", "weather", "soil-lab", "drone"];

#[test]
fn every_navigation_is_immediately_visible_in_view_and_fragment() {
    let history = Arc::new(MemoryHistory::default());
    let mut router = NavigationRouter::new(Arc::clone(&history));

    // Deterministic walk over all tag pairs.
    for (i, a) in TAGS.iter().enumerate() {
        for b in TAGS.iter().skip(i) {
            for tag in [a, b] {
                router.navigate(tag);
                assert_eq!(router.active_view().as_str(), *tag);
                assert_eq!(history.current_fragment(), *tag);
            }
        }
    }
}

#[test]
fn startup_fragment_decides_the_first_view() {
    for tag in TAGS {
        let router = NavigationRouter::new(MemoryHistory::with_fragment(&format!("#{}", tag)));
        assert_eq!(router.active_view(), &ViewTag::from_fragment(tag));
        assert_eq!(router.active_view().as_str(), tag);
    }
    let router = NavigationRouter::new(MemoryHistory::with_fragment(""));
    assert_eq!(router.active_view(), &ViewTag::Dashboard);
}

#[test]
fn walking_back_to_the_start_lands_on_the_deep_link() {
    let history = Arc::new(MemoryHistory::with_fragment("#mandi"));
    let mut router = NavigationRouter::new(Arc::clone(&history));
    for tag in ["weather", "crops", "bot"] {
        router.navigate(tag);
    }
    while let Some(fragment) = history.back() {
        router.on_history_change(&fragment);
    }
    assert_eq!(router.active_view(), &ViewTag::Mandi);
    assert_eq!(history.len(), 4);
}
