//! End-to-end engine scenarios against scripted mock adapters
//!
//! These run the full pipeline (account validation, scan, filter, run loop)
//! with fake resource kinds, under a paused tokio clock so multi-sweep runs
//! finish instantly.

use tokio_util::sync::CancellationToken;

use sandsweep::aws::Account;
use sandsweep::{ItemState, RunError, Sweeper, SweeperParams};
use sandsweep_common::{Collection, Config, ConfigError};
use sandsweep_test_utils::{registry_of, test_region, MockKind, MockResourceSpec};

const ACCOUNT_ID: &str = "000000000000";

fn config(yaml: &str) -> Config {
    serde_yaml::from_str(yaml).unwrap()
}

/// A config that accepts any account and filters nothing.
fn open_config() -> Config {
    config("regions: [r1]\naccounts:\n  \"__default__\": {}\n")
}

fn account() -> Account {
    Account::new(ACCOUNT_ID, vec!["sandbox".to_string()])
}

fn sweeper(params: SweeperParams, config: Config, kinds: &[(&'static str, &MockKind)]) -> Sweeper {
    Sweeper::new(
        params,
        config,
        account(),
        registry_of(kinds),
        vec![test_region("r1")],
    )
}

fn live_run() -> SweeperParams {
    SweeperParams {
        no_dry_run: true,
        ..Default::default()
    }
}

fn states(sweeper: &Sweeper) -> Vec<ItemState> {
    sweeper.queue().iter().map(|i| i.state()).collect()
}

#[tokio::test]
async fn dry_run_scans_but_never_removes() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("a1"));
    kind.add(MockResourceSpec::new("a2"));

    let mut sweeper = sweeper(SweeperParams::default(), open_config(), &[("A", &kind)]);
    sweeper.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(states(&sweeper), vec![ItemState::New, ItemState::New]);
    // Right after a scan every item is either nukeable or filtered.
    let queue = sweeper.queue();
    assert_eq!(
        queue.count(&[ItemState::New]) + queue.count(&[ItemState::Filtered]),
        queue.count_total()
    );
    assert_eq!(kind.list_calls(), 1);
    assert_eq!(kind.remove_calls("a1"), 0);
    assert_eq!(kind.remove_calls("a2"), 0);
    assert!(kind.exists("a1") && kind.exists("a2"));
}

#[tokio::test(start_paused = true)]
async fn happy_path_finishes_both_items() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("a1"));
    kind.add(MockResourceSpec::new("a2"));

    let mut sweeper = sweeper(live_run(), open_config(), &[("A", &kind)]);
    sweeper.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        states(&sweeper),
        vec![ItemState::Finished, ItemState::Finished]
    );
    assert_eq!(sweeper.queue().count(&[ItemState::Failed]), 0);
    assert_eq!(sweeper.queue().count(&[ItemState::Filtered]), 0);
    assert_eq!(sweeper.queue().count(&[ItemState::Finished]), 2);
    // Sweep 1 only issues removals; sweep 2 checks both items against a
    // single cached list call.
    assert_eq!(kind.list_calls(), 2);
    assert_eq!(kind.remove_calls("a1"), 1);
    assert_eq!(kind.remove_calls("a2"), 1);
}

#[tokio::test(start_paused = true)]
async fn dependency_failure_resolves_on_retry() {
    let kind = MockKind::new();
    // a1 refuses to go while a2 exists, then succeeds on the retry sweep.
    kind.add(
        MockResourceSpec::new("a1")
            .remove_outcomes(vec![Err("dependent resource a2 still exists".into())]),
    );
    kind.add(MockResourceSpec::new("a2"));

    let mut sweeper = sweeper(live_run(), open_config(), &[("A", &kind)]);
    sweeper.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(
        states(&sweeper),
        vec![ItemState::Finished, ItemState::Finished]
    );
    assert_eq!(kind.remove_calls("a1"), 2);
    assert_eq!(kind.remove_calls("a2"), 1);
}

#[tokio::test(start_paused = true)]
async fn fail_stall_aborts_after_tolerated_sweeps() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("stuck").remove_always_fails("deletion protection enabled"));

    let mut sweeper = sweeper(live_run(), open_config(), &[("A", &kind)]);
    let err = sweeper.run(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.downcast_ref::<RunError>(), Some(&RunError::FailStall));
    assert_eq!(states(&sweeper), vec![ItemState::Failed]);
    // Sweep 1 turns the item failed; two more no-progress sweeps are
    // tolerated before the abort, each retrying the removal.
    assert_eq!(kind.remove_calls("stuck"), 3);
    assert!(kind.exists("stuck"));
}

#[tokio::test(start_paused = true)]
async fn wait_stall_aborts_when_only_polling() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("slow").lingers());

    let params = SweeperParams {
        no_dry_run: true,
        max_wait_retries: 2,
        ..Default::default()
    };
    let mut sweeper = sweeper(params, open_config(), &[("A", &kind)]);
    let err = sweeper.run(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.downcast_ref::<RunError>(), Some(&RunError::WaitStall(2)));
    assert_eq!(kind.remove_calls("slow"), 1);
}

#[tokio::test(start_paused = true)]
async fn config_filter_keeps_matching_instance() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("keep-me").property("Name", "keep-me"));
    kind.add(MockResourceSpec::new("drop-me").property("Name", "drop-me"));

    let config = config(
        r#"
regions: [r1]
accounts:
  "000000000000":
    filters:
      Bucket:
        - property: Name
          value: keep-me
"#,
    );

    let mut sweeper = sweeper(live_run(), config, &[("Bucket", &kind)]);
    sweeper.run(&CancellationToken::new()).await.unwrap();

    let queue = sweeper.queue();
    let by_id: Vec<_> = queue
        .iter()
        .map(|i| (i.resource().id(), i.state(), i.reason().to_string()))
        .collect();
    assert!(by_id.contains(&(
        "keep-me".to_string(),
        ItemState::Filtered,
        "filtered by config".to_string()
    )));
    assert!(by_id
        .iter()
        .any(|(id, state, _)| id == "drop-me" && *state == ItemState::Finished));

    assert_eq!(kind.remove_calls("keep-me"), 0);
    assert_eq!(kind.remove_calls("drop-me"), 1);
    assert!(kind.exists("keep-me"));
    assert!(!kind.exists("drop-me"));
}

#[tokio::test(start_paused = true)]
async fn unsupported_property_rule_is_skipped() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("a1").property("Name", "a1"));

    // The rule names a property the adapter does not know; the rule must be
    // skipped rather than filter (or abort on) the item.
    let config = config(
        r#"
regions: [r1]
accounts:
  "000000000000":
    filters:
      A:
        - property: Bogus
          value: a1
"#,
    );
    let mut sweeper = sweeper(live_run(), config, &[("A", &kind)]);
    sweeper.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(states(&sweeper), vec![ItemState::Finished]);
    assert_eq!(kind.remove_calls("a1"), 1);
}

#[tokio::test]
async fn broken_property_aborts_the_scan() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("a1").property_fails("Name"));

    let config = config(
        r#"
regions: [r1]
accounts:
  "000000000000":
    filters:
      A:
        - property: Name
          value: a1
"#,
    );
    let mut sweeper = sweeper(live_run(), config, &[("A", &kind)]);
    let err = sweeper.run(&CancellationToken::new()).await.unwrap_err();

    assert!(err.to_string().contains("Name"));
    assert_eq!(kind.remove_calls("a1"), 0);
    assert!(kind.exists("a1"));
}

#[tokio::test(start_paused = true)]
async fn inverted_filter_flips_what_is_kept() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("keep-me").property("Name", "keep-me"));
    kind.add(MockResourceSpec::new("drop-me").property("Name", "drop-me"));

    // Inverted rule: everything whose Name is NOT drop-me is filtered.
    let config = config(
        r#"
regions: [r1]
accounts:
  "000000000000":
    filters:
      A:
        - property: Name
          value: drop-me
          invert: true
"#,
    );
    let mut sweeper = sweeper(live_run(), config, &[("A", &kind)]);
    sweeper.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(kind.remove_calls("keep-me"), 0);
    assert_eq!(kind.remove_calls("drop-me"), 1);
    assert!(kind.exists("keep-me"));
    assert!(!kind.exists("drop-me"));
}

#[tokio::test]
async fn account_not_in_config_aborts_before_scan() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("a1"));

    // Config pins account 111...; the live account is 000... with no default.
    let config = config("regions: [r1]\naccounts:\n  \"111111111111\": {}\n");
    let mut sweeper = sweeper(live_run(), config, &[("A", &kind)]);
    let err = sweeper.run(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::UnknownAccount(ACCOUNT_ID.to_string()))
    );
    assert_eq!(kind.list_calls(), 0);
    assert_eq!(sweeper.queue().count_total(), 0);
}

#[tokio::test]
async fn alias_mismatch_aborts_before_scan() {
    let kind = MockKind::new();
    let config = config(
        "regions: [r1]\naccounts:\n  \"000000000000\":\n    aliases: [staging]\n",
    );
    let mut sweeper = sweeper(live_run(), config, &[("A", &kind)]);
    let err = sweeper.run(&CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::AliasMismatch { .. })
    ));
    assert_eq!(kind.list_calls(), 0);
}

#[tokio::test]
async fn blocklisted_account_aborts_before_scan() {
    let kind = MockKind::new();
    let config = config(
        "regions: [r1]\naccount-blocklist: [\"000000000000\"]\naccounts:\n  \"__default__\": {}\n",
    );
    let mut sweeper = sweeper(live_run(), config, &[("A", &kind)]);
    let err = sweeper.run(&CancellationToken::new()).await.unwrap_err();

    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::BlocklistedAccount(ACCOUNT_ID.to_string()))
    );
    assert_eq!(kind.list_calls(), 0);
}

#[tokio::test]
async fn unknown_target_kind_aborts() {
    let kind = MockKind::new();
    let params = SweeperParams {
        targets: Collection::from(vec!["Bogus".to_string()]),
        ..Default::default()
    };
    let mut sweeper = sweeper(params, open_config(), &[("A", &kind)]);
    let err = sweeper.run(&CancellationToken::new()).await.unwrap_err();

    assert!(err.to_string().contains("unknown resource types"));
    assert!(err.to_string().contains("Bogus"));
    assert_eq!(kind.list_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn adapter_self_filter_marks_item_filtered() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("managed").protected("cannot delete provider default"));
    kind.add(MockResourceSpec::new("plain"));

    let mut sweeper = sweeper(live_run(), open_config(), &[("A", &kind)]);
    sweeper.run(&CancellationToken::new()).await.unwrap();

    let filtered: Vec<_> = sweeper
        .queue()
        .iter()
        .filter(|i| i.state() == ItemState::Filtered)
        .map(|i| (i.resource().id(), i.reason().to_string()))
        .collect();
    assert_eq!(
        filtered,
        vec![(
            "managed".to_string(),
            "cannot delete provider default".to_string()
        )]
    );
    assert_eq!(kind.remove_calls("managed"), 0);
    assert_eq!(kind.remove_calls("plain"), 1);
}

#[tokio::test(start_paused = true)]
async fn newly_protected_resource_is_never_finished() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("shielded").lingers());

    let params = SweeperParams {
        no_dry_run: true,
        max_wait_retries: 3,
        ..Default::default()
    };
    let mut sweeper = sweeper(params, open_config(), &[("A", &kind)]);

    // The provider starts protecting the instance after the scan (list call
    // 1), so every existence check sees a protected equal resource.
    kind.protect_from_call("shielded", "now provider-managed", 2);

    let err = sweeper.run(&CancellationToken::new()).await.unwrap_err();
    assert_eq!(err.downcast_ref::<RunError>(), Some(&RunError::WaitStall(3)));

    // The item kept its pre-check state instead of being finished off.
    assert_eq!(sweeper.queue().count(&[ItemState::Finished]), 0);
    assert_eq!(states(&sweeper), vec![ItemState::Pending]);
}

#[tokio::test]
async fn feature_flags_reach_scanned_resources() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("a1"));

    let config = config(
        r#"
regions: [r1]
feature-flags:
  disable-deletion-protection:
    EC2Instance: true
accounts:
  "__default__": {}
"#,
    );
    let mut sweeper = sweeper(SweeperParams::default(), config, &[("A", &kind)]);
    sweeper.run(&CancellationToken::new()).await.unwrap();

    let flags = kind.flags_seen();
    assert_eq!(flags.len(), 1);
    assert!(flags[0].disable_deletion_protection.ec2_instance);
}

#[tokio::test]
async fn config_excludes_skip_whole_kinds() {
    let a = MockKind::new();
    a.add(MockResourceSpec::new("a1"));
    let b = MockKind::new();
    b.add(MockResourceSpec::new("b1"));

    let config = config(
        "regions: [r1]\nresource-types:\n  excludes: [B]\naccounts:\n  \"__default__\": {}\n",
    );
    let mut sweeper = sweeper(SweeperParams::default(), config, &[("A", &a), ("B", &b)]);
    sweeper.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(sweeper.queue().count_total(), 1);
    assert_eq!(a.list_calls(), 1);
    assert_eq!(b.list_calls(), 0);
}

#[tokio::test]
async fn per_account_targets_narrow_the_scan() {
    let a = MockKind::new();
    a.add(MockResourceSpec::new("a1"));
    let b = MockKind::new();
    b.add(MockResourceSpec::new("b1"));

    let config = config(
        r#"
regions: [r1]
accounts:
  "000000000000":
    resource-types:
      targets: [A]
"#,
    );
    let mut sweeper = sweeper(SweeperParams::default(), config, &[("A", &a), ("B", &b)]);
    sweeper.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(sweeper.queue().count_total(), 1);
    assert_eq!(b.list_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn sweep_list_failure_marks_failed_then_recovers() {
    let kind = MockKind::new();
    kind.add(MockResourceSpec::new("a1"));

    let mut sweeper = sweeper(live_run(), open_config(), &[("A", &kind)]);

    // The scan lists once (call 1). Sweep 1 only issues the removal; sweep
    // 2's existence check is list call 2, which fails and marks the item
    // failed. Sweep 3 retries the removal and re-checks, finding the
    // instance gone.
    kind.fail_list_call(2, "throttled");

    sweeper.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(states(&sweeper), vec![ItemState::Finished]);
    assert_eq!(kind.remove_calls("a1"), 2);
    assert_eq!(kind.list_calls(), 3);
}
