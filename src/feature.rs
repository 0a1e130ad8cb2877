//! Optional link capabilities and the registry that negotiates them.
//!
//! Each side of a tunnel keeps a set of features it is willing to use and
//! learns the set the peer advertises during the handshake. A feature is
//! *used* only when both sides agree. The registry stores absence as "not
//! offered", so a disabled local feature is simply removed.

use std::{
    borrow::Cow,
    collections::{BTreeMap, HashSet},
};

use derive_more::Display;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Opaque name of an optional capability.
///
/// # Examples
///
/// ```
/// use wsvpn::feature::Feature;
/// assert_eq!(Feature::FRAGMENTATION.as_str(), "fragmentation");
/// assert_eq!(Feature::new("zstd").to_string(), "zstd");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(transparent)]
#[display("{_0}")]
pub struct Feature(Cow<'static, str>);

impl Feature {
    /// Splitting oversized packets across several transport messages.
    pub const FRAGMENTATION: Feature = Feature(Cow::Borrowed("fragmentation"));
    /// Compressing data messages.
    pub const COMPRESSION: Feature = Feature(Cow::Borrowed("compression"));

    /// Create a feature from its wire name.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self { Self(name.into()) }

    /// Borrow the wire name.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

/// Local, remote and negotiated feature sets for one connection.
#[derive(Clone, Debug, Default)]
pub struct FeatureRegistry {
    local: HashSet<Feature>,
    remote: HashSet<Feature>,
    used: HashSet<Feature>,
}

impl FeatureRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Enable or disable a feature on this side of the link.
    ///
    /// Disabling removes the feature entirely. The used set is not touched;
    /// it only changes when [`recompute_used`](Self::recompute_used) runs.
    pub fn set_local(&mut self, feature: Feature, enabled: bool) {
        if enabled {
            self.local.insert(feature);
        } else {
            self.local.remove(&feature);
        }
    }

    /// Whether `feature` is enabled locally.
    #[must_use]
    pub fn is_local(&self, feature: &Feature) -> bool { self.local.contains(feature) }

    /// Record whether the peer advertises `feature`.
    pub fn set_remote(&mut self, feature: Feature, present: bool) {
        if present {
            self.remote.insert(feature);
        } else {
            self.remote.remove(&feature);
        }
    }

    /// Replace the remote advertisement wholesale.
    ///
    /// Entries mapped to `false` are treated the same as missing ones.
    pub fn replace_remote<I>(&mut self, advertised: I)
    where
        I: IntoIterator<Item = (Feature, bool)>,
    {
        self.remote = advertised
            .into_iter()
            .filter_map(|(feature, present)| present.then_some(feature))
            .collect();
    }

    /// Whether the peer advertises `feature`.
    #[must_use]
    pub fn is_remote(&self, feature: &Feature) -> bool { self.remote.contains(feature) }

    /// Whether `feature` was negotiated by the last recomputation.
    #[must_use]
    pub fn is_used(&self, feature: &Feature) -> bool { self.used.contains(feature) }

    /// Iterate over the negotiated features.
    pub fn used(&self) -> impl Iterator<Item = &Feature> { self.used.iter() }

    /// The advertisement this side sends to its peer.
    #[must_use]
    pub fn advertisement(&self) -> BTreeMap<Feature, bool> {
        self.local
            .iter()
            .map(|feature| (feature.clone(), true))
            .collect()
    }

    /// Rebuild the used set as the intersection of local and remote.
    pub fn recompute_used(&mut self) {
        let used: HashSet<Feature> = self.local.intersection(&self.remote).cloned().collect();
        for feature in &self.local {
            debug!(
                "feature state: feature={feature}, local=true, remote={}, used={}",
                self.remote.contains(feature),
                used.contains(feature)
            );
        }
        info!(
            "features negotiated: before=[{}], after=[{}]",
            sorted_names(&self.used),
            sorted_names(&used)
        );
        self.used = used;
    }
}

fn sorted_names(set: &HashSet<Feature>) -> String {
    let mut names: Vec<&str> = set.iter().map(Feature::as_str).collect();
    names.sort_unstable();
    names.join(",")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn feature_strategy() -> impl Strategy<Value = Feature> {
        prop_oneof![
            Just(Feature::FRAGMENTATION),
            Just(Feature::COMPRESSION),
            "[a-z]{1,6}".prop_map(Feature::new),
        ]
    }

    #[rstest]
    #[case(true, true)]
    #[case(false, false)]
    fn set_local_reflects_flag(#[case] enabled: bool, #[case] expected: bool) {
        let mut registry = FeatureRegistry::new();
        registry.set_local(Feature::COMPRESSION, enabled);
        assert_eq!(registry.is_local(&Feature::COMPRESSION), expected);
    }

    #[test]
    fn disabling_removes_feature_from_advertisement() {
        let mut registry = FeatureRegistry::new();
        registry.set_local(Feature::FRAGMENTATION, true);
        registry.set_local(Feature::COMPRESSION, true);
        registry.set_local(Feature::COMPRESSION, false);

        let advertised = registry.advertisement();
        assert_eq!(advertised.len(), 1);
        assert_eq!(advertised.get(&Feature::FRAGMENTATION), Some(&true));
    }

    #[test]
    fn remote_false_entries_count_as_absent() {
        let mut registry = FeatureRegistry::new();
        registry.set_local(Feature::FRAGMENTATION, true);
        registry.set_local(Feature::COMPRESSION, true);
        registry.replace_remote([
            (Feature::FRAGMENTATION, true),
            (Feature::COMPRESSION, false),
        ]);
        registry.recompute_used();

        assert!(registry.is_used(&Feature::FRAGMENTATION));
        assert!(!registry.is_used(&Feature::COMPRESSION));
    }

    #[test]
    fn recompute_drops_stale_entries() {
        let mut registry = FeatureRegistry::new();
        registry.set_local(Feature::COMPRESSION, true);
        registry.set_remote(Feature::COMPRESSION, true);
        registry.recompute_used();
        assert!(registry.is_used(&Feature::COMPRESSION));

        registry.set_remote(Feature::COMPRESSION, false);
        registry.recompute_used();
        assert_eq!(registry.used().count(), 0);
    }

    #[test]
    fn feature_names_serialise_as_plain_strings() {
        let mut map = BTreeMap::new();
        map.insert(Feature::FRAGMENTATION, true);
        let json = serde_json::to_string(&map).expect("serialise features");
        assert_eq!(json, r#"{"fragmentation":true}"#);

        let parsed: BTreeMap<Feature, bool> = serde_json::from_str(&json).expect("parse features");
        assert_eq!(parsed, map);
    }

    proptest! {
        #[test]
        fn local_set_is_last_write_wins(ops in prop::collection::vec((feature_strategy(), any::<bool>()), 0..32)) {
            let mut registry = FeatureRegistry::new();
            let mut expected: HashMap<Feature, bool> = HashMap::new();
            for (feature, enabled) in ops {
                registry.set_local(feature.clone(), enabled);
                expected.insert(feature, enabled);
            }
            for (feature, enabled) in expected {
                prop_assert_eq!(registry.is_local(&feature), enabled);
            }
        }

        #[test]
        fn used_is_intersection_of_local_and_remote(
            local in prop::collection::vec((feature_strategy(), any::<bool>()), 0..16),
            remote in prop::collection::vec((feature_strategy(), any::<bool>()), 0..16),
        ) {
            let mut registry = FeatureRegistry::new();
            for (feature, enabled) in &local {
                registry.set_local(feature.clone(), *enabled);
            }
            registry.replace_remote(remote.clone());
            registry.recompute_used();
            let first: HashSet<Feature> = registry.used().cloned().collect();

            registry.recompute_used();
            let second: HashSet<Feature> = registry.used().cloned().collect();
            prop_assert_eq!(&first, &second);

            for feature in local.iter().chain(remote.iter()).map(|(f, _)| f) {
                let expected = registry.is_local(feature) && registry.is_remote(feature);
                prop_assert_eq!(registry.is_used(feature), expected);
            }
        }
    }
}
