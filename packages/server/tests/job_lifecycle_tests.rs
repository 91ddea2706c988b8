//! Job ownership and lifecycle (§3): archiving a job must cascade to every
//! child endpoint atomically.

mod common;

use chrono::Utc;
use server_core::common::UserId;
use server_core::domain::{HttpMethod, JobStatus};
use server_core::store::types::{JobPatch, NewEndpoint, NewJob};
use server_core::store::{BaseEndpointStore, BaseJobStore};
use test_context::test_context;

use common::TestHarness;

async fn seed_user(harness: &TestHarness) -> UserId {
    let user_id = UserId::new();
    sqlx::query("INSERT INTO users (id, tier, created_at, updated_at) VALUES ($1, 'free', NOW(), NOW())")
        .bind(user_id)
        .execute(&harness.db_pool)
        .await
        .unwrap();
    user_id
}

#[test_context(TestHarness)]
#[tokio::test]
async fn archiving_a_job_cascades_to_its_endpoints(harness: &TestHarness) {
    let user_id = seed_user(harness).await;
    let job = harness
        .job_store
        .create_job(NewJob {
            user_id,
            name: "weather pipeline".into(),
            description: Some("pulls hourly weather data".into()),
        })
        .await
        .unwrap();

    let now = Utc::now();
    let mut endpoint_ids = Vec::new();
    for name in ["fetch", "transform"] {
        let endpoint = harness
            .endpoint_store
            .create_endpoint(NewEndpoint {
                job_id: job.id,
                tenant_id: user_id,
                name: name.into(),
                description: None,
                baseline_cron: Some("0 * * * *".into()),
                baseline_interval_ms: None,
                min_interval_ms: None,
                max_interval_ms: None,
                url: format!("https://example.com/{name}"),
                method: HttpMethod::Get,
                headers: None,
                body: None,
                timeout_ms: None,
                max_execution_time_ms: None,
                max_response_size_kb: None,
                next_run_at: now,
            })
            .await
            .unwrap();
        endpoint_ids.push(endpoint.id);
    }

    let archived = harness
        .job_store
        .set_job_status(job.id, JobStatus::Archived, now)
        .await
        .unwrap();
    assert_eq!(archived.status, JobStatus::Archived);

    for id in endpoint_ids {
        let endpoint = harness.endpoint_store.get_endpoint(id).await.unwrap().unwrap();
        assert!(endpoint.archived_at.is_some());
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn update_job_applies_some_none_clear_convention(harness: &TestHarness) {
    let user_id = seed_user(harness).await;
    let job = harness
        .job_store
        .create_job(NewJob {
            user_id,
            name: "original name".into(),
            description: Some("original description".into()),
        })
        .await
        .unwrap();

    // Untouched: both fields None.
    let unchanged = harness
        .job_store
        .update_job(job.id, JobPatch::default())
        .await
        .unwrap();
    assert_eq!(unchanged.name, "original name");
    assert_eq!(unchanged.description.as_deref(), Some("original description"));

    // Clear the description via Some(None), rename via Some(Some(..)).
    let patched = harness
        .job_store
        .update_job(
            job.id,
            JobPatch {
                name: Some("renamed".into()),
                description: Some(None),
            },
        )
        .await
        .unwrap();
    assert_eq!(patched.name, "renamed");
    assert_eq!(patched.description, None);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn list_jobs_by_user_only_returns_that_users_jobs(harness: &TestHarness) {
    let user_a = seed_user(harness).await;
    let user_b = seed_user(harness).await;

    harness
        .job_store
        .create_job(NewJob {
            user_id: user_a,
            name: "a-job".into(),
            description: None,
        })
        .await
        .unwrap();
    harness
        .job_store
        .create_job(NewJob {
            user_id: user_b,
            name: "b-job".into(),
            description: None,
        })
        .await
        .unwrap();

    let jobs_a = harness.job_store.list_jobs_by_user(user_a).await.unwrap();
    assert_eq!(jobs_a.len(), 1);
    assert_eq!(jobs_a[0].name, "a-job");
}
