//! Wakeup service specs

use crate::prelude::*;
use refl_engine::{AlwaysLeader, NewGoal, ReflectionAdmin, WakeupService};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn admin_wakeup_reconciles_a_new_goal() {
    let TestContext { manager, catalog, stores, .. } = setup();
    catalog.add_dataset("dst-1", Some("s1"));
    let manager = Arc::new(Mutex::new(manager));
    let cancel = CancellationToken::new();
    let (service, handle) =
        WakeupService::new(Arc::clone(&manager), AlwaysLeader, HOUR, cancel.clone());
    let admin = ReflectionAdmin::new(&*manager.lock().await, Some(handle));
    let task = tokio::spawn(service.run());

    let goal = admin
        .create_goal(NewGoal {
            dataset_id: "dst-1".into(),
            name: "orders".to_string(),
            reflection_type: refl_core::ReflectionType::Raw,
            details: refl_core::ReflectionDetails::raw(["id"]),
            arrow_caching_enabled: false,
        })
        .unwrap();
    admin.wakeup("spec").await.unwrap().await.unwrap();

    let entry = stores.entries.fetch(&goal.id).unwrap();
    assert_eq!(entry.state, ReflectionState::Refreshing);

    cancel.cancel();
    task.await.unwrap();
}
