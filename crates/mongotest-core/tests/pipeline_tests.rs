//! Filter pipeline combination and preparation tests

mod common;

use common::*;
use common::assert_eq;
use mongotest_core::environment::{LifecycleOptions, TopologyKind};
use mongotest_core::filter::{
    CiFilter, DatabaseVersionFilter, FilterPipeline, HostVersionFilter, HostVersionSource,
    PlatformFilter, StandardFilters, TopologyFilter,
};
use mongotest_core::{ErrorKind, FilterError, TestCase, TestMetadata, TestSuite};
use proptest::prelude::*;
use semver::Version;

const NAMES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

fn pipeline_of(verdicts: &[bool]) -> FilterPipeline {
    let mut pipeline = FilterPipeline::new();
    for (i, verdict) in verdicts.iter().enumerate() {
        pipeline.push(Box::new(Fixed(NAMES[i % NAMES.len()], *verdict)));
    }
    pipeline
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// Combination laws
// ============================================================================

proptest! {
    #[test]
    fn prop_pipeline_is_and_of_filters(verdicts in prop::collection::vec(any::<bool>(), 0..6)) {
        let (env, _calls) = default_environment(TopologyKind::Standalone);
        let prepared = runtime().block_on(pipeline_of(&verdicts).prepare(&env)).unwrap();

        let expected = verdicts.iter().all(|v| *v);
        prop_assert_eq!(prepared.decide(&TestMetadata::default()), expected);
        prop_assert_eq!(prepared.rejected_by(&TestMetadata::default()).is_none(), expected);
    }

    #[test]
    fn prop_pipeline_order_does_not_matter(
        (verdicts, shuffled) in prop::collection::vec(any::<bool>(), 0..6)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let (env, _calls) = default_environment(TopologyKind::Standalone);
        let rt = runtime();
        let original = rt.block_on(pipeline_of(&verdicts).prepare(&env)).unwrap();
        let permuted = rt.block_on(pipeline_of(&shuffled).prepare(&env)).unwrap();

        prop_assert_eq!(
            original.decide(&TestMetadata::default()),
            permuted.decide(&TestMetadata::default())
        );
        prop_assert_eq!(
            original.rejected_by(&TestMetadata::default()).is_none(),
            permuted.rejected_by(&TestMetadata::default()).is_none()
        );
    }
}

#[tokio::test]
async fn test_empty_pipeline_accepts_everything() {
    let (env, _calls) = default_environment(TopologyKind::Standalone);
    let prepared = FilterPipeline::new().prepare(&env).await.unwrap();
    assert!(prepared.is_empty());
    assert!(prepared.decide(&metadata("[requires]\ntopology = \"sharded\"\n")));
}

#[tokio::test]
async fn test_rejected_by_names_first_rejecting_filter() {
    let (env, _calls) = default_environment(TopologyKind::Standalone);
    let prepared = FilterPipeline::new()
        .with(Fixed("first", true))
        .with(Fixed("second", false))
        .with(Fixed("third", false))
        .prepare(&env)
        .await
        .unwrap();

    assert_eq!(prepared.rejected_by(&TestMetadata::default()), Some("second"));
    assert_eq!(prepared.names(), vec!["first", "second", "third"]);
}

// ============================================================================
// Absent requirements
// ============================================================================

#[tokio::test]
async fn test_every_builtin_filter_accepts_absent_metadata() {
    let (mut env, _calls) = default_environment(TopologyKind::Sharded);
    env.start().await.unwrap();

    let prepared = FilterPipeline::new()
        .with(TopologyFilter::new(TopologyKind::Sharded))
        .with(HostVersionFilter::new(HostVersionSource::Fixed(Version::new(1, 0, 0))))
        .with(DatabaseVersionFilter::new(true))
        .with(PlatformFilter::with_platform("win32"))
        .with(CiFilter::with_detected(true))
        .prepare(&env)
        .await
        .unwrap();

    for toml in ["", "[requires]\n", "[ignore]\n", "[requires]\n[ignore]\n"] {
        assert!(prepared.decide(&metadata(toml)), "rejected {:?}", toml);
    }
}

// ============================================================================
// Preparation
// ============================================================================

#[tokio::test]
async fn test_database_version_filter_against_live_version() {
    let (mut env, calls) = default_environment(TopologyKind::ReplicaSet);
    env.start().await.unwrap();

    let prepared = FilterPipeline::new()
        .with(DatabaseVersionFilter::new(true))
        .prepare(&env)
        .await
        .unwrap();

    assert!(prepared.decide(&metadata("[requires]\nmongodb = \">=4.0.0\"\n")));
    assert!(!prepared.decide(&metadata("[requires]\nmongodb = \">=5.0.0\"\n")));
    assert_eq!(calls.count("buildInfo:integration_tests"), 1);
}

#[tokio::test]
async fn test_probe_failure_fails_preparation() {
    let script = Script {
        fail_build_info: true,
        ..Script::default()
    };
    let (mut env, _calls) = environment(TopologyKind::Standalone, script, LifecycleOptions::default());
    env.start().await.unwrap();

    let err = FilterPipeline::new()
        .with(DatabaseVersionFilter::new(true))
        .prepare(&env)
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        FilterError::Probe {
            filter: "mongodb-version",
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Probe);
}

#[tokio::test]
async fn test_disabled_version_check_never_probes() {
    let (mut env, calls) = default_environment(TopologyKind::Standalone);
    env.start().await.unwrap();

    let prepared = FilterPipeline::new()
        .with(DatabaseVersionFilter::new(false))
        .prepare(&env)
        .await
        .unwrap();

    assert!(prepared.decide(&metadata("[requires]\nmongodb = \">=10.0.0\"\n")));
    assert_eq!(calls.count("buildInfo:integration_tests"), 0);
}

#[tokio::test]
async fn test_any_failing_prepare_fails_the_pipeline() {
    let (env, _calls) = default_environment(TopologyKind::Standalone);
    let result = FilterPipeline::new()
        .with(Fixed("ok", true))
        .with(Broken)
        .prepare(&env)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_standard_pipeline_on_external_topology() {
    let (mut env, calls) = environment(
        TopologyKind::Standalone,
        Script::default(),
        LifecycleOptions::external(),
    );
    env.start().await.unwrap();

    let config = StandardFilters::for_topology(TopologyKind::Standalone)
        .with_host_version(HostVersionSource::Fixed(Version::new(18, 2, 0)))
        .with_ci_markers(Vec::new());
    let prepared = FilterPipeline::standard(config).prepare(&env).await.unwrap();

    assert!(prepared.decide(&metadata(
        "[requires]\ntopology = \"single\"\nmongodb = \">=4.0\"\nhost = \">=18\"\n"
    )));
    assert_eq!(
        prepared.rejected_by(&metadata("[requires]\ntopology = [\"replicaset\"]\n")),
        Some("topology")
    );
    assert_eq!(
        prepared.rejected_by(&metadata("[requires]\nnode = \">=20.0.0\"\n")),
        Some("host-version")
    );
    assert_eq!(calls.all(), vec!["connect", "buildInfo:integration_tests"]);
}

#[tokio::test]
async fn test_unconfigured_host_version_fails_when_a_test_needs_it() {
    let (mut env, _calls) = environment(
        TopologyKind::Standalone,
        Script::default(),
        LifecycleOptions::external(),
    );
    env.start().await.unwrap();

    let suite = TestSuite::new(vec![
        TestCase::new("plain"),
        TestCase::new("node gated").with_metadata(metadata("[requires]\nnode = \">=4.0.0\"\n")),
    ]);
    let config = StandardFilters::for_topology(TopologyKind::Standalone)
        .probing_only_for(&suite)
        .with_ci_markers(Vec::new());
    let err = FilterPipeline::standard(config).prepare(&env).await.err().unwrap();

    assert!(matches!(
        err,
        FilterError::HostVersion {
            filter: "host-version",
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Probe);
}

#[tokio::test]
async fn test_unconfigured_host_version_is_fine_without_host_requirements() {
    let (mut env, _calls) = environment(
        TopologyKind::Standalone,
        Script::default(),
        LifecycleOptions::external(),
    );
    env.start().await.unwrap();

    let suite = TestSuite::new(vec![TestCase::new("plain")]);
    let config = StandardFilters::for_topology(TopologyKind::Standalone)
        .probing_only_for(&suite)
        .with_ci_markers(Vec::new());
    let prepared = FilterPipeline::standard(config).prepare(&env).await.unwrap();

    assert!(prepared.decide(&TestMetadata::default()));
}
