use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::StatusCode;
use serde_json::{json, Value};

use eventcrm_campaigns::Template;
use eventcrm_core::{CategoryId, Channel, CustomerId, EventId, OrganizerId, PlanTier, TemplateId};
use eventcrm_infra::workers::WorkerHandle;
use eventcrm_infra::{Engine, EngineConfig};

struct TestServer {
    base_url: String,
    engine: Arc<Engine>,
    handle: tokio::task::JoinHandle<()>,
    workers: Option<WorkerHandle>,
}

impl TestServer {
    async fn spawn(config: EngineConfig) -> Self {
        // Same router as prod, but bound to an ephemeral port.
        let engine = Arc::new(Engine::in_memory(config));
        let workers = engine.spawn_delivery_workers().expect("failed to start workers");
        let app = eventcrm_api::app::build_app(engine.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            engine,
            handle,
            workers: Some(workers),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn email_template(&self) -> TemplateId {
        let id = TemplateId::new();
        self.engine
            .collaborators
            .templates
            .insert(Template {
                id,
                channel: Channel::Email,
                code: "season-opening".into(),
                editable_fields: vec![],
                tier: PlanTier::Basic,
            })
            .unwrap();
        id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
        if let Some(workers) = self.workers.take() {
            workers.shutdown();
        }
    }
}

/// Create a consenting customer with one purchase, so "all customers" reaches them.
async fn seed_buyer(
    client: &reqwest::Client,
    server: &TestServer,
    org: OrganizerId,
    email: &str,
) -> CustomerId {
    let customer = CustomerId::new();
    let res = client
        .put(server.url(&format!("/customers/{customer}")))
        .header("x-organizer-id", org.to_string())
        .json(&json!({ "email": email, "marketing_consent": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(server.url(&format!("/customers/{customer}/purchases")))
        .header("x-organizer-id", org.to_string())
        .json(&json!({
            "event_id": EventId::new(),
            "category_id": CategoryId::new(),
            "amount_cents": 4500,
            "ticket_count": 1,
            "purchased_at": Utc::now(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    customer
}

async fn get_campaign_eventually<F>(
    client: &reqwest::Client,
    server: &TestServer,
    org: OrganizerId,
    id: &str,
    ready: F,
) -> Value
where
    F: Fn(&Value) -> bool,
{
    // Delivery happens on the worker pool; poll until it has caught up.
    for _ in 0..100 {
        let body: Value = client
            .get(server.url(&format!("/campaigns/{id}")))
            .header("x-organizer-id", org.to_string())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if ready(&body) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    panic!("campaign {id} did not reach the expected state in time");
}

#[tokio::test]
async fn health_is_public_but_organizer_routes_need_the_header() {
    let server = TestServer::spawn(EngineConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(server.url("/campaigns")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "organizer_required");

    let res = client
        .get(server.url("/campaigns"))
        .header("x-organizer-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let org = OrganizerId::new();
    let body: Value = client
        .get(server.url("/whoami"))
        .header("x-organizer-id", org.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["organizer_id"], org.to_string());
}

#[tokio::test]
async fn campaign_is_created_delivered_and_settled_by_webhooks() {
    let server = TestServer::spawn(EngineConfig::default()).await;
    let client = reqwest::Client::new();
    let org = OrganizerId::new();
    let template = server.email_template();

    seed_buyer(&client, &server, org, "ana@example.com").await;
    seed_buyer(&client, &server, org, "bruno@example.com").await;

    let preview: Value = client
        .post(server.url("/campaigns/preview"))
        .header("x-organizer-id", org.to_string())
        .json(&json!({ "channel": "EMAIL", "segment": { "kind": "all" } }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(preview["recipients"], 2);

    let res = client
        .post(server.url("/campaigns"))
        .header("x-organizer-id", org.to_string())
        .json(&json!({
            "channel": "EMAIL",
            "template_id": template,
            "name": "  Season opening  ",
            "segment": { "kind": "all" },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["total_recipients"], 2);
    assert_eq!(created["name"], "Season opening");
    let id = created["id"].as_str().unwrap().to_string();

    // Email rows wait in PROCESSING for the provider once they carry a dispatch id.
    let sending = get_campaign_eventually(&client, &server, org, &id, |c| {
        c["deliveries"]
            .as_array()
            .is_some_and(|rows| rows.iter().all(|r| r["dispatch_id"].is_string()))
    })
    .await;
    assert_eq!(sending["status"], "SENDING");
    assert_eq!(sending["summary"]["PROCESSING"], 2);

    let dispatch_ids: Vec<String> = sending["deliveries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["dispatch_id"].as_str().unwrap().to_string())
        .collect();

    let res = client
        .post(server.url("/webhooks/delivery"))
        .json(&json!({
            "dispatchId": dispatch_ids[0],
            "eventType": "DELIVERED",
            "timestamp": Utc::now(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let receipt: Value = res.json().await.unwrap();
    assert_eq!(receipt["outcome"], "applied");

    // Replays are acknowledged but change nothing.
    let replay: Value = client
        .post(server.url("/webhooks/delivery"))
        .json(&json!({
            "dispatchId": dispatch_ids[0],
            "eventType": "DELIVERED",
            "timestamp": Utc::now(),
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(replay["outcome"], "ignored");

    let res = client
        .post(server.url("/webhooks/delivery"))
        .json(&json!({
            "dispatchId": dispatch_ids[1],
            "eventType": "BOUNCED",
            "timestamp": Utc::now(),
            "errorMessage": "mailbox full",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let done = get_campaign_eventually(&client, &server, org, &id, |c| c["status"] == "SENT").await;
    assert_eq!(done["sent_count"], 1);
    assert_eq!(done["summary"]["DELIVERED"], 1);
    assert_eq!(done["summary"]["BOUNCED"], 1);

    let quota: Value = client
        .get(server.url("/quota/email"))
        .header("x-organizer-id", org.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(quota["used"], 2);
    assert_eq!(quota["channel"], "EMAIL");

    let res = client
        .get(server.url("/reports"))
        .header("x-organizer-id", org.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["overview"]["total_campaigns"], 1);

    // Another organizer sees none of it.
    let other: Value = client
        .get(server.url("/campaigns"))
        .header("x-organizer-id", OrganizerId::new().to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(other["items"], json!([]));
}

#[tokio::test]
async fn exhausted_quota_is_rejected_with_the_remaining_count() {
    let config = EngineConfig {
        quota_limit_basic: 1,
        ..EngineConfig::default()
    };
    let server = TestServer::spawn(config).await;
    let client = reqwest::Client::new();
    let org = OrganizerId::new();
    let template = server.email_template();

    seed_buyer(&client, &server, org, "ana@example.com").await;
    seed_buyer(&client, &server, org, "bruno@example.com").await;

    let res = client
        .post(server.url("/campaigns"))
        .header("x-organizer-id", org.to_string())
        .json(&json!({
            "channel": "EMAIL",
            "template_id": template,
            "segment": { "kind": "all" },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "quota_exceeded");
    assert_eq!(body["remaining"], 1);

    let list: Value = client
        .get(server.url("/campaigns"))
        .header("x-organizer-id", org.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["items"], json!([]));
}

#[tokio::test]
async fn tags_are_created_assigned_and_listed() {
    let server = TestServer::spawn(EngineConfig::default()).await;
    let client = reqwest::Client::new();
    let org = OrganizerId::new();
    let customer = seed_buyer(&client, &server, org, "ana@example.com").await;

    let res = client
        .post(server.url("/tags"))
        .header("x-organizer-id", org.to_string())
        .json(&json!({ "name": "VIP", "color": "#AA3300" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let tag_id = created["tag"]["id"].as_str().unwrap().to_string();

    let duplicate = client
        .post(server.url("/tags"))
        .header("x-organizer-id", org.to_string())
        .json(&json!({ "name": "vip", "color": "#AA3300" }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let assigned: Value = client
        .post(server.url(&format!("/tags/{tag_id}/customers/{customer}")))
        .header("x-organizer-id", org.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(assigned["assigned"], true);

    let tags: Value = client
        .get(server.url("/tags"))
        .header("x-organizer-id", org.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tags["items"][0]["members"], 1);

    let res = client
        .post(server.url("/campaigns/preview"))
        .header("x-organizer-id", org.to_string())
        .json(&json!({
            "channel": "EMAIL",
            "segment": { "kind": "tags", "tag_ids": [tag_id] },
        }))
        .send()
        .await
        .unwrap();
    let preview: Value = res.json().await.unwrap();
    assert_eq!(preview["recipients"], 1);

    let removed: Value = client
        .delete(server.url(&format!("/tags/{tag_id}/customers/{customer}")))
        .header("x-organizer-id", org.to_string())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(removed["removed"], true);
}

#[tokio::test]
async fn unknown_dispatch_ids_are_not_found() {
    let server = TestServer::spawn(EngineConfig::default()).await;
    let client = reqwest::Client::new();

    let res = client
        .post(server.url("/webhooks/delivery"))
        .json(&json!({
            "dispatchId": "never-issued",
            "eventType": "DELIVERED",
            "timestamp": Utc::now(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unknown_dispatch");
}
