//! Protocol version negotiation.
//!
//! The handshake carries a single integer protocol version. Over time the
//! meaning of fragmentation and compression changed with that version, so a
//! peer's version selects one of four compatibility buckets, and each bucket
//! derives the link policy differently:
//!
//! | remote version | bucket                  | fragmentation         | compression |
//! |----------------|-------------------------|-----------------------|-------------|
//! | `< 10`         | [`Legacy`]              | off                   | off         |
//! | `10`           | [`AlwaysFragment`]      | on                    | off         |
//! | `11`           | [`NegotiatedFragment`]  | local flag            | off         |
//! | `>= 12`        | [`FeatureField`]        | negotiated feature    | negotiated  |
//!
//! [`Legacy`]: CompatibilityBucket::Legacy
//! [`AlwaysFragment`]: CompatibilityBucket::AlwaysFragment
//! [`NegotiatedFragment`]: CompatibilityBucket::NegotiatedFragment
//! [`FeatureField`]: CompatibilityBucket::FeatureField

use derive_more::{Display, From, Into};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feature::{Feature, FeatureRegistry};

/// Version value meaning "no handshake received yet".
pub const UNDETERMINED_PROTOCOL_VERSION: u32 = 0;
/// First version whose peers always fragment data messages.
pub const FRAGMENTATION_MIN_PROTOCOL: u32 = 10;
/// First version that negotiates fragmentation with a dedicated flag.
pub const FRAGMENTATION_NEGOTIATED_MIN_PROTOCOL: u32 = 11;
/// First version that carries the general feature advertisement.
pub const FEATURE_FIELD_MIN_PROTOCOL: u32 = 12;
/// Version announced by this implementation.
pub const PROTOCOL_VERSION: u32 = 12;

/// Protocol version announced by a peer.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    From,
    Into,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
#[display("{_0}")]
pub struct ProtocolVersion(u32);

impl ProtocolVersion {
    /// Placeholder used until the peer's handshake arrives.
    pub const UNDETERMINED: Self = Self(UNDETERMINED_PROTOCOL_VERSION);
    /// The version this implementation speaks.
    pub const CURRENT: Self = Self(PROTOCOL_VERSION);

    /// Wrap a raw version number.
    #[must_use]
    pub const fn new(value: u32) -> Self { Self(value) }

    /// Return the raw version number.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }

    /// Whether a real version has been recorded.
    #[must_use]
    pub const fn is_determined(self) -> bool { self.0 != UNDETERMINED_PROTOCOL_VERSION }
}

/// Historical negotiation contract selected by the peer's version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompatibilityBucket {
    /// Peers predating fragmentation support.
    Legacy,
    /// Peers that always fragment without negotiating it.
    AlwaysFragment,
    /// Peers that negotiate fragmentation through a dedicated boolean.
    NegotiatedFragment,
    /// Peers that advertise a general feature map.
    FeatureField,
}

/// Lower bounds of each bucket, highest first.
const BUCKETS: [(u32, CompatibilityBucket); 3] = [
    (FEATURE_FIELD_MIN_PROTOCOL, CompatibilityBucket::FeatureField),
    (
        FRAGMENTATION_NEGOTIATED_MIN_PROTOCOL,
        CompatibilityBucket::NegotiatedFragment,
    ),
    (FRAGMENTATION_MIN_PROTOCOL, CompatibilityBucket::AlwaysFragment),
];

impl CompatibilityBucket {
    /// Select the bucket covering `version`.
    #[must_use]
    pub fn for_version(version: ProtocolVersion) -> Self {
        BUCKETS
            .iter()
            .find(|(min, _)| version.get() >= *min)
            .map_or(Self::Legacy, |(_, bucket)| *bucket)
    }

    /// Whether peers in this bucket send the general feature map.
    #[must_use]
    pub const fn uses_feature_field(self) -> bool { matches!(self, Self::FeatureField) }

    /// Derive the link policy for this bucket from the current features.
    ///
    /// `features` must already have its used set recomputed.
    #[must_use]
    pub fn policy(self, features: &FeatureRegistry) -> LinkPolicy {
        match self {
            Self::Legacy => LinkPolicy::default(),
            Self::AlwaysFragment => LinkPolicy {
                fragmentation: true,
                compression: false,
            },
            Self::NegotiatedFragment => LinkPolicy {
                fragmentation: features.is_local(&Feature::FRAGMENTATION),
                compression: false,
            },
            Self::FeatureField => LinkPolicy {
                fragmentation: features.is_used(&Feature::FRAGMENTATION),
                compression: features.is_used(&Feature::COMPRESSION),
            },
        }
    }
}

/// Effective data-path behaviour after negotiation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkPolicy {
    /// Data messages carry a fragment header and may be split.
    pub fragmentation: bool,
    /// Data messages may be compressed.
    ///
    /// The engine never compresses; a [`TransportAdapter`] that supports
    /// compression reads this through [`Connection::link_policy`].
    ///
    /// [`TransportAdapter`]: crate::adapter::TransportAdapter
    /// [`Connection::link_policy`]: crate::connection::Connection::link_policy
    pub compression: bool,
}

/// Errors raised while applying a peer's handshake.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum NegotiationError {
    /// The peer announced the reserved "undetermined" version.
    #[error("peer announced invalid protocol version {0}")]
    InvalidVersion(ProtocolVersion),
    /// A version was already recorded for this connection.
    #[error("protocol version already determined as {current}")]
    AlreadyDetermined { current: ProtocolVersion },
}

/// Per-connection negotiation state machine.
#[derive(Debug, Default)]
pub struct Negotiator {
    features: FeatureRegistry,
    remote_version: ProtocolVersion,
    policy: LinkPolicy,
}

impl Negotiator {
    /// Create a negotiator seeded with the local feature set.
    #[must_use]
    pub fn new(features: FeatureRegistry) -> Self {
        Self {
            features,
            remote_version: ProtocolVersion::UNDETERMINED,
            policy: LinkPolicy::default(),
        }
    }

    /// Borrow the feature registry.
    #[must_use]
    pub fn features(&self) -> &FeatureRegistry { &self.features }

    /// Mutably borrow the feature registry.
    ///
    /// Changing features here does not recompute the policy.
    pub fn features_mut(&mut self) -> &mut FeatureRegistry { &mut self.features }

    /// The peer's version, or [`ProtocolVersion::UNDETERMINED`].
    #[must_use]
    pub fn remote_version(&self) -> ProtocolVersion { self.remote_version }

    /// The current link policy.
    #[must_use]
    pub fn policy(&self) -> LinkPolicy { self.policy }

    /// The bucket of the peer's version, once known.
    #[must_use]
    pub fn bucket(&self) -> Option<CompatibilityBucket> {
        self.remote_version
            .is_determined()
            .then(|| CompatibilityBucket::for_version(self.remote_version))
    }

    /// Apply a full handshake: remote features, legacy flag and version.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError`] if the version is invalid or was already
    /// determined. State is left untouched in that case.
    pub fn complete_handshake<I>(
        &mut self,
        version: ProtocolVersion,
        legacy_fragmentation: bool,
        advertised: I,
    ) -> Result<LinkPolicy, NegotiationError>
    where
        I: IntoIterator<Item = (Feature, bool)>,
    {
        self.check_determinable(version)?;
        if CompatibilityBucket::for_version(version).uses_feature_field() {
            self.features.replace_remote(advertised);
        } else {
            self.apply_legacy_fragmentation(legacy_fragmentation);
        }
        self.determine(version)
    }

    /// Record the peer's version and derive the policy.
    ///
    /// # Errors
    ///
    /// Returns [`NegotiationError::InvalidVersion`] for version 0 and
    /// [`NegotiationError::AlreadyDetermined`] on a second call.
    pub fn determine(&mut self, version: ProtocolVersion) -> Result<LinkPolicy, NegotiationError> {
        self.check_determinable(version)?;
        self.remote_version = version;
        Ok(self.recompute())
    }

    /// Record the legacy single-purpose fragmentation flag.
    ///
    /// Ignored once the peer is known to use the feature field. Returns
    /// whether the policy was recomputed.
    pub fn apply_legacy_fragmentation(&mut self, enabled: bool) -> bool {
        if self.bucket().is_some_and(CompatibilityBucket::uses_feature_field) {
            return false;
        }
        self.features.set_remote(Feature::FRAGMENTATION, enabled);
        self.recompute_if_determined()
    }

    /// Replace the peer's feature advertisement.
    ///
    /// Before the handshake the advertisement is stored for later. After it,
    /// only feature-field peers may change their advertisement; older peers'
    /// policy is fixed. Returns whether the policy was recomputed.
    pub fn update_remote_features<I>(&mut self, advertised: I) -> bool
    where
        I: IntoIterator<Item = (Feature, bool)>,
    {
        match self.bucket() {
            None => {
                self.features.replace_remote(advertised);
                false
            }
            Some(bucket) if bucket.uses_feature_field() => {
                self.features.replace_remote(advertised);
                self.recompute();
                true
            }
            Some(_) => false,
        }
    }

    /// Recompute used features and the link policy.
    ///
    /// While the version is undetermined the policy keeps its defaults.
    pub fn recompute(&mut self) -> LinkPolicy {
        let Some(bucket) = self.bucket() else {
            return self.policy;
        };
        self.features.recompute_used();
        self.policy = bucket.policy(&self.features);
        info!(
            "link policy: remote_version={}, bucket={bucket:?}, fragmentation={}, compression={}",
            self.remote_version,
            enabled_str(self.policy.fragmentation),
            enabled_str(self.policy.compression)
        );
        self.policy
    }

    fn recompute_if_determined(&mut self) -> bool {
        if self.remote_version.is_determined() {
            self.recompute();
            true
        } else {
            false
        }
    }

    fn check_determinable(&self, version: ProtocolVersion) -> Result<(), NegotiationError> {
        if self.remote_version.is_determined() {
            return Err(NegotiationError::AlreadyDetermined {
                current: self.remote_version,
            });
        }
        if !version.is_determined() {
            return Err(NegotiationError::InvalidVersion(version));
        }
        Ok(())
    }
}

fn enabled_str(flag: bool) -> &'static str { if flag { "enabled" } else { "disabled" } }

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    const NO_FEATURES: [(Feature, bool); 0] = [];

    fn registry(local: &[Feature]) -> FeatureRegistry {
        let mut registry = FeatureRegistry::new();
        for feature in local {
            registry.set_local(feature.clone(), true);
        }
        registry
    }

    #[rstest]
    #[case(1, CompatibilityBucket::Legacy)]
    #[case(9, CompatibilityBucket::Legacy)]
    #[case(10, CompatibilityBucket::AlwaysFragment)]
    #[case(11, CompatibilityBucket::NegotiatedFragment)]
    #[case(12, CompatibilityBucket::FeatureField)]
    #[case(40, CompatibilityBucket::FeatureField)]
    fn bucket_boundaries(#[case] version: u32, #[case] expected: CompatibilityBucket) {
        assert_eq!(
            CompatibilityBucket::for_version(ProtocolVersion::new(version)),
            expected
        );
    }

    #[test]
    fn undetermined_keeps_default_policy() {
        let mut negotiator = Negotiator::new(registry(&[Feature::FRAGMENTATION]));
        assert!(!negotiator.update_remote_features([(Feature::FRAGMENTATION, true)]));
        assert_eq!(negotiator.recompute(), LinkPolicy::default());
        assert_eq!(negotiator.bucket(), None);
    }

    #[test]
    fn version_eleven_without_local_flag_disables_fragmentation() {
        let mut negotiator = Negotiator::new(FeatureRegistry::new());
        let policy = negotiator
            .complete_handshake(ProtocolVersion::new(11), true, NO_FEATURES)
            .expect("handshake");
        assert_eq!(policy, LinkPolicy::default());
    }

    #[test]
    fn version_eleven_with_local_flag_enables_fragmentation() {
        let mut negotiator = Negotiator::new(registry(&[Feature::FRAGMENTATION]));
        let policy = negotiator
            .complete_handshake(ProtocolVersion::new(11), false, NO_FEATURES)
            .expect("handshake");
        assert!(policy.fragmentation);
        assert!(!policy.compression);
    }

    #[test]
    fn version_twelve_uses_feature_intersection() {
        let mut negotiator = Negotiator::new(registry(&[Feature::FRAGMENTATION]));
        let policy = negotiator
            .complete_handshake(
                ProtocolVersion::new(12),
                false,
                [
                    (Feature::FRAGMENTATION, true),
                    (Feature::COMPRESSION, false),
                ],
            )
            .expect("handshake");
        assert_eq!(
            policy,
            LinkPolicy {
                fragmentation: true,
                compression: false,
            }
        );
        let used: Vec<&Feature> = negotiator.features().used().collect();
        assert_eq!(used, vec![&Feature::FRAGMENTATION]);
    }

    #[test]
    fn second_version_is_rejected() {
        let mut negotiator = Negotiator::new(FeatureRegistry::new());
        negotiator
            .determine(ProtocolVersion::new(12))
            .expect("first version");
        let err = negotiator
            .determine(ProtocolVersion::new(10))
            .expect_err("second version must fail");
        assert_eq!(
            err,
            NegotiationError::AlreadyDetermined {
                current: ProtocolVersion::new(12)
            }
        );
        assert_eq!(negotiator.remote_version(), ProtocolVersion::new(12));
    }

    #[test]
    fn version_zero_is_invalid() {
        let mut negotiator = Negotiator::new(FeatureRegistry::new());
        assert_eq!(
            negotiator.determine(ProtocolVersion::UNDETERMINED),
            Err(NegotiationError::InvalidVersion(ProtocolVersion::UNDETERMINED))
        );
    }

    #[test]
    fn legacy_peers_ignore_later_advertisements() {
        let mut negotiator = Negotiator::new(registry(&[Feature::COMPRESSION]));
        negotiator
            .complete_handshake(ProtocolVersion::new(11), false, NO_FEATURES)
            .expect("handshake");
        assert!(!negotiator.update_remote_features([(Feature::COMPRESSION, true)]));
        assert!(!negotiator.policy().compression);
    }

    #[test]
    fn feature_field_peers_can_readvertise() {
        let mut negotiator = Negotiator::new(registry(&[Feature::COMPRESSION]));
        negotiator
            .complete_handshake(ProtocolVersion::new(12), false, NO_FEATURES)
            .expect("handshake");
        assert!(!negotiator.policy().compression);

        assert!(negotiator.update_remote_features([(Feature::COMPRESSION, true)]));
        assert!(negotiator.policy().compression);
    }

    #[test]
    fn legacy_flag_is_ignored_for_feature_field_peers() {
        let mut negotiator = Negotiator::new(registry(&[Feature::FRAGMENTATION]));
        negotiator
            .complete_handshake(ProtocolVersion::new(12), false, NO_FEATURES)
            .expect("handshake");
        assert!(!negotiator.apply_legacy_fragmentation(true));
        assert!(!negotiator.policy().fragmentation);
    }

    #[rstest]
    #[case(10, true)]
    #[case(11, false)]
    fn handshake_records_legacy_flag_as_remote_feature(#[case] version: u32, #[case] flag: bool) {
        let mut negotiator = Negotiator::new(registry(&[Feature::FRAGMENTATION]));
        negotiator
            .complete_handshake(ProtocolVersion::new(version), flag, NO_FEATURES)
            .expect("handshake");
        assert_eq!(negotiator.features().is_remote(&Feature::FRAGMENTATION), flag);
    }

    #[test]
    fn legacy_flag_before_handshake_is_stored_without_recompute() {
        let mut negotiator = Negotiator::new(registry(&[Feature::FRAGMENTATION]));
        assert!(!negotiator.apply_legacy_fragmentation(true));
        assert!(negotiator.features().is_remote(&Feature::FRAGMENTATION));
        assert_eq!(negotiator.policy(), LinkPolicy::default());
    }

    fn flags() -> impl Strategy<Value = (bool, bool, bool, bool)> {
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>())
    }

    proptest! {
        #[test]
        fn pre_fragmentation_versions_disable_everything(
            version in 1u32..FRAGMENTATION_MIN_PROTOCOL,
            (local_frag, local_comp, remote_frag, remote_comp) in flags(),
        ) {
            let mut features = FeatureRegistry::new();
            features.set_local(Feature::FRAGMENTATION, local_frag);
            features.set_local(Feature::COMPRESSION, local_comp);
            let mut negotiator = Negotiator::new(features);
            let policy = negotiator
                .complete_handshake(
                    ProtocolVersion::new(version),
                    remote_frag,
                    [(Feature::FRAGMENTATION, remote_frag), (Feature::COMPRESSION, remote_comp)],
                )
                .expect("handshake");
            prop_assert_eq!(policy, LinkPolicy::default());
        }

        #[test]
        fn always_fragment_bucket_ignores_flags(
            (local_frag, local_comp, remote_frag, remote_comp) in flags(),
        ) {
            let mut features = FeatureRegistry::new();
            features.set_local(Feature::FRAGMENTATION, local_frag);
            features.set_local(Feature::COMPRESSION, local_comp);
            let mut negotiator = Negotiator::new(features);
            let policy = negotiator
                .complete_handshake(
                    ProtocolVersion::new(FRAGMENTATION_MIN_PROTOCOL),
                    remote_frag,
                    [(Feature::COMPRESSION, remote_comp)],
                )
                .expect("handshake");
            prop_assert!(policy.fragmentation);
            prop_assert!(!policy.compression);
        }

        #[test]
        fn negotiated_bucket_follows_local_flag(
            (local_frag, local_comp, remote_frag, _remote_comp) in flags(),
        ) {
            let mut features = FeatureRegistry::new();
            features.set_local(Feature::FRAGMENTATION, local_frag);
            features.set_local(Feature::COMPRESSION, local_comp);
            let mut negotiator = Negotiator::new(features);
            let policy = negotiator
                .complete_handshake(
                    ProtocolVersion::new(FRAGMENTATION_NEGOTIATED_MIN_PROTOCOL),
                    remote_frag,
                    NO_FEATURES,
                )
                .expect("handshake");
            prop_assert_eq!(policy.fragmentation, local_frag);
            prop_assert!(!policy.compression);
        }

        #[test]
        fn feature_field_bucket_uses_intersection(
            version in FEATURE_FIELD_MIN_PROTOCOL..64,
            (local_frag, local_comp, remote_frag, remote_comp) in flags(),
        ) {
            let mut features = FeatureRegistry::new();
            features.set_local(Feature::FRAGMENTATION, local_frag);
            features.set_local(Feature::COMPRESSION, local_comp);
            let mut negotiator = Negotiator::new(features);
            let policy = negotiator
                .complete_handshake(
                    ProtocolVersion::new(version),
                    !remote_frag,
                    [(Feature::FRAGMENTATION, remote_frag), (Feature::COMPRESSION, remote_comp)],
                )
                .expect("handshake");
            prop_assert_eq!(policy.fragmentation, local_frag && remote_frag);
            prop_assert_eq!(policy.compression, local_comp && remote_comp);
        }
    }
}
