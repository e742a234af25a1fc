mod common;

use std::sync::Arc;

use common::*;
use rscloud_lifecycle::prelude::*;

fn resource(api: &Arc<FakeHookApi>) -> LifecycleHookResource {
    LifecycleHookResource::new(hook_manager(api), "LifecycleHook.drain", hook_input())
}

#[tokio::test]
async fn converge_creates_and_reads_back_computed_values() {
    let api = Arc::new(FakeHookApi::default());
    let mut hook = resource(&api);

    let identity = hook.converge(hook_input(), &ctx()).await.unwrap();

    assert_eq!(identity, Identity::hierarchical("asg-1", "hook-1"));
    assert_eq!(identity.to_string(), "asg-1/hook-1");
    let output = hook.output.clone().unwrap();
    assert_eq!(output.default_result.as_deref(), Some("ABANDON"));
    assert_eq!(output.heartbeat_timeout, Some(3600));
    assert_eq!(output.global_timeout, Some(360000));
    assert_eq!(hook.input, hook_input());
}

#[tokio::test]
async fn omitted_optional_fields_are_not_sent() {
    let api = Arc::new(FakeHookApi::default());
    let mut hook = resource(&api);
    hook.converge(hook_input(), &ctx()).await.unwrap();

    let state = api.state();
    assert_eq!(state.puts.len(), 1);
    let request = &state.puts[0];
    assert_eq!(request.default_result, None);
    assert_eq!(request.heartbeat_timeout, None);
    assert_eq!(request.notification_metadata, None);
    assert_eq!(request.notification_target_arn, None);
    assert_eq!(request.role_arn, None);
}

#[tokio::test]
async fn unchanged_input_skips_the_write() {
    let api = Arc::new(FakeHookApi::default());
    let mut hook = resource(&api);
    hook.converge(hook_input(), &ctx()).await.unwrap();
    hook.converge(hook_input(), &ctx()).await.unwrap();

    assert_eq!(api.state().puts.len(), 1);
}

#[tokio::test]
async fn changed_heartbeat_is_put_again() {
    let api = Arc::new(FakeHookApi::default());
    let mut hook = resource(&api);
    hook.converge(hook_input(), &ctx()).await.unwrap();

    let desired = LifecycleHookInput {
        heartbeat_timeout: Some(600),
        ..hook_input()
    };
    hook.converge(desired.clone(), &ctx()).await.unwrap();

    assert_eq!(api.state().puts.len(), 2);
    assert_eq!(api.state().puts[1].heartbeat_timeout, Some(600));
    assert_eq!(hook.output.as_ref().unwrap().heartbeat_timeout, Some(600));
    assert_eq!(hook.input, desired);
}

#[tokio::test]
async fn renaming_requires_replacement() {
    let api = Arc::new(FakeHookApi::default());
    let mut hook = resource(&api);
    hook.converge(hook_input(), &ctx()).await.unwrap();

    let err = hook
        .converge(
            LifecycleHookInput {
                name: "hook-2".to_string(),
                ..hook_input()
            },
            &ctx(),
        )
        .await
        .unwrap_err();

    match err {
        ResourceError::RequiresReplacement { fields, .. } => assert_eq!(fields, vec!["name"]),
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(api.state().puts.len(), 1);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_call() {
    let api = Arc::new(FakeHookApi::default());
    let mut hook = resource(&api);

    let err = hook
        .converge(
            LifecycleHookInput {
                lifecycle_transition: String::new(),
                ..hook_input()
            },
            &ctx(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err.manager_error(), Some(ManagerError::Validation(_))));
    assert_eq!(api.state().put_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn publish_errors_are_retried_until_the_put_succeeds() {
    let api = Arc::new(FakeHookApi::default());
    api.state().transient_puts = 3;
    let mut hook = resource(&api);

    hook.converge(hook_input(), &ctx()).await.unwrap();

    assert_eq!(api.state().put_attempts, 4);
    assert!(hook.exists());
}

#[tokio::test(start_paused = true)]
async fn publish_errors_past_the_window_fail_the_operation() {
    let api = Arc::new(FakeHookApi::default());
    api.state().transient_puts = u32::MAX;
    let mut hook = resource(&api);

    let err = hook.converge(hook_input(), &ctx()).await.unwrap_err();

    match err.manager_error() {
        Some(ManagerError::OperationFailed { attempts, last, .. }) => {
            assert!(*attempts > 1);
            assert_eq!(last.message, PUBLISH_ERROR);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!hook.exists());
}

#[tokio::test]
async fn other_put_errors_are_not_retried() {
    let api = Arc::new(FakeHookApi::default());
    api.state().put_error = Some(ApiError::new(
        "ValidationError",
        "Unable to find the Auto Scaling group asg-1",
    ));
    let mut hook = resource(&api);

    let err = hook.converge(hook_input(), &ctx()).await.unwrap_err();

    assert!(matches!(err.manager_error(), Some(ManagerError::Remote(_))));
    assert_eq!(api.state().put_attempts, 1);
}

#[tokio::test]
async fn cancelled_operations_stop_retrying() {
    let api = Arc::new(FakeHookApi::default());
    api.state().transient_puts = u32::MAX;
    let mut hook = resource(&api);
    let ctx = ctx();
    ctx.cancel.cancel();

    let err = hook.converge(hook_input(), &ctx).await.unwrap_err();

    assert!(matches!(err.manager_error(), Some(ManagerError::Cancelled)));
}

#[tokio::test]
async fn drift_deletion_clears_state_in_steady_state() {
    let api = Arc::new(FakeHookApi::default());
    let mut hook = resource(&api);
    hook.converge(hook_input(), &ctx()).await.unwrap();
    api.state().hooks.clear();

    let reconciled = hook
        .reconcile(ReadContext::SteadyState, &ctx())
        .await
        .unwrap();

    assert_eq!(reconciled, Reconciled::Deleted);
    assert!(!hook.exists());
    assert!(hook.output.is_none());
}

#[tokio::test]
async fn missing_hook_right_after_a_write_is_an_error() {
    let api = Arc::new(FakeHookApi::default());
    let mut hook = resource(&api);
    hook.converge(hook_input(), &ctx()).await.unwrap();
    api.state().hooks.clear();

    let err = hook
        .reconcile(ReadContext::Creating, &ctx())
        .await
        .unwrap_err();

    assert!(err.manager_error().map_or(false, ManagerError::is_not_found));
    assert!(hook.exists());
}

#[tokio::test]
async fn lookup_matches_the_exact_hook_name() {
    let api = Arc::new(FakeHookApi::default());
    let manager = hook_manager(&api);
    resource(&api).converge(hook_input(), &ctx()).await.unwrap();

    let err = manager
        .lookup(&Identity::hierarchical("asg-1", "hook-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, ManagerError::NotFound(_)));

    let found = manager
        .lookup(&Identity::hierarchical("asg-1", "hook-1"))
        .await
        .unwrap();
    assert_eq!(found.name, "hook-1");
}

#[tokio::test]
async fn response_without_a_hook_list_counts_as_gone() {
    let api = Arc::new(FakeHookApi::default());
    api.state().describe_empty = true;
    let manager: LifecycleHookManagerRef = hook_manager(&api);
    let identity = Identity::hierarchical("asg-1", "hook-1");

    assert!(matches!(
        manager.lookup(&identity).await,
        Err(ManagerError::EmptyResult(_))
    ));
    let reconciled = reconcile(&*manager, &identity, ReadContext::SteadyState)
        .await
        .unwrap();
    assert_eq!(reconciled, Reconciled::Deleted);
}

#[tokio::test]
async fn deleting_twice_succeeds() {
    let api = Arc::new(FakeHookApi::default());
    let manager: LifecycleHookManagerRef = hook_manager(&api);
    let mut hook = resource(&api);
    hook.converge(hook_input(), &ctx()).await.unwrap();

    assert!(hook.destroy(&ctx()).await.unwrap());
    assert!(!hook.destroy(&ctx()).await.unwrap());
    assert!(!ensure_absent(&*manager, &Identity::hierarchical("asg-1", "hook-1"))
        .await
        .unwrap());
    assert_eq!(api.state().deletes, 1);
}

#[tokio::test]
async fn imported_hook_adopts_the_remote_input() {
    let api = Arc::new(FakeHookApi::default());
    resource(&api)
        .converge(
            LifecycleHookInput {
                heartbeat_timeout: Some(900),
                ..hook_input()
            },
            &ctx(),
        )
        .await
        .unwrap();

    let mut hook =
        LifecycleHookResource::import(hook_manager(&api), "LifecycleHook.drain", "asg-1/hook-1")
            .unwrap();
    assert_eq!(hook.identity, Some(Identity::hierarchical("asg-1", "hook-1")));
    let reconciled = hook
        .reconcile(ReadContext::SteadyState, &ctx())
        .await
        .unwrap();
    assert!(reconciled.present().is_some());
    hook.adopt_remote_input().unwrap();

    assert_eq!(hook.input.lifecycle_transition, "autoscaling:EC2_INSTANCE_TERMINATING");
    assert_eq!(hook.input.heartbeat_timeout, Some(900));
    hook.converge(hook.input.clone(), &ctx()).await.unwrap();
    assert_eq!(api.state().puts.len(), 1);
}

#[tokio::test]
async fn imported_computed_values_stay_when_left_unset() {
    let api = Arc::new(FakeHookApi::default());
    resource(&api)
        .converge(
            LifecycleHookInput {
                default_result: Some("CONTINUE".to_string()),
                ..hook_input()
            },
            &ctx(),
        )
        .await
        .unwrap();

    let mut hook =
        LifecycleHookResource::import(hook_manager(&api), "LifecycleHook.drain", "asg-1/hook-1")
            .unwrap();
    hook.reconcile(ReadContext::SteadyState, &ctx())
        .await
        .unwrap();
    hook.adopt_remote_input().unwrap();
    assert_eq!(hook.input.default_result.as_deref(), Some("CONTINUE"));

    hook.converge(hook_input(), &ctx()).await.unwrap();

    let state = api.state();
    assert_eq!(state.puts.len(), 1);
    let remote = &state.hooks[&("asg-1".to_string(), "hook-1".to_string())];
    assert_eq!(remote.default_result.as_deref(), Some("CONTINUE"));
    assert_eq!(remote.heartbeat_timeout, Some(3600));
}

#[test]
fn import_ids_need_both_parts() {
    let api = Arc::new(FakeHookApi::default());
    let err =
        LifecycleHookResource::import(hook_manager(&api), "LifecycleHook.drain", "asg-1")
            .unwrap_err();
    assert_eq!(
        err.to_string(),
        "importing LifecycleHook.drain (asg-1): unexpected format (\"asg-1\"), expected <asg-name>/<lifecycle-hook-name>"
    );
}
