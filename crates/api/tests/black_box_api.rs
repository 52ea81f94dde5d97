use std::sync::Arc;
use std::time::Duration;

use posledger_core::{TenantId, UserId};
use posledger_infra::{Engine, EngineConfig};
use reqwest::StatusCode;
use serde_json::{json, Value};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over an in-memory engine, bound to an ephemeral port.
        let engine = Arc::new(Engine::in_memory(EngineConfig::default()));
        let app = posledger_api::app::build_app(engine);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A caller bound to one tenant and user.
struct Caller {
    client: reqwest::Client,
    base_url: String,
    tenant_id: TenantId,
    user_id: UserId,
}

impl Caller {
    fn new(srv: &TestServer) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: srv.base_url.clone(),
            tenant_id: TenantId::new(),
            user_id: UserId::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("x-tenant-id", self.tenant_id.to_string())
            .header("x-user-id", self.user_id.to_string())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .request(reqwest::Method::POST, path)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self.request(reqwest::Method::GET, path).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn outlet(&self, name: &str) -> String {
        let (status, body) = self.post("/outlets", json!({ "name": name })).await;
        assert_eq!(status, StatusCode::CREATED, "body={body}");
        body["outlet_id"].as_str().unwrap().to_string()
    }

    async fn product(&self, name: &str, threshold: i64) -> String {
        let (status, body) = self
            .post(
                "/products",
                json!({
                    "name": name,
                    "settings": { "track_inventory": true, "low_stock_threshold": threshold },
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "body={body}");
        body["product_id"].as_str().unwrap().to_string()
    }

    async fn till(&self, outlet: &str, name: &str) -> String {
        let (status, body) = self
            .post("/tills", json!({ "outlet_id": outlet, "name": name }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "body={body}");
        body["till_id"].as_str().unwrap().to_string()
    }
}

fn movement(outlet: &str, product: &str, movement_type: &str, quantity: i64) -> Value {
    json!({
        "outlet_id": outlet,
        "product_id": product,
        "movement_type": movement_type,
        "quantity": quantity,
    })
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_header_is_required() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/outlets", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_header");

    let res = client
        .get(format!("{}/outlets", srv.base_url))
        .header("x-tenant-id", "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Writes also need a user.
    let res = client
        .post(format!("{}/outlets", srv.base_url))
        .header("x-tenant-id", TenantId::new().to_string())
        .json(&json!({ "name": "Main" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn purchase_then_sale_leaves_thirty_eight() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);
    let outlet = caller.outlet("Main").await;
    let product = caller.product("Widget", 5).await;

    let (status, body) = caller
        .post("/movements", movement(&outlet, &product, "purchase", 50))
        .await;
    assert_eq!(status, StatusCode::CREATED, "body={body}");
    let (status, _) = caller
        .post("/movements", movement(&outlet, &product, "sale", -12))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, stock) = caller
        .get(&format!("/stock?outlet={outlet}&product={product}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock["quantity"], 38);
    assert_eq!(stock["is_low"], false);
    assert_eq!(stock["watermark"], 2);

    let (status, page) = caller
        .get(&format!("/movements?outlet={outlet}&type=sale"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["movements"][0]["quantity"], -12);
}

#[tokio::test]
async fn idempotency_key_replays_and_conflicts() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);
    let outlet = caller.outlet("Main").await;
    let product = caller.product("Widget", 0).await;

    let send = |quantity: i64| {
        caller
            .request(reqwest::Method::POST, "/movements")
            .header("idempotency-key", "k-1")
            .json(&movement(&outlet, &product, "purchase", quantity))
            .send()
    };

    let first = send(10).await.unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first: Value = first.json().await.unwrap();

    let replay = send(10).await.unwrap();
    assert_eq!(replay.status(), StatusCode::OK);
    let replay: Value = replay.json().await.unwrap();
    assert_eq!(replay["replayed"], true);
    assert_eq!(replay["movement"]["movement_id"], first["movement"]["movement_id"]);

    let reused = send(11).await.unwrap();
    assert_eq!(reused.status(), StatusCode::CONFLICT);
    let reused: Value = reused.json().await.unwrap();
    assert_eq!(reused["error"], "idempotency_key_reused");
}

#[tokio::test]
async fn invalid_movements_are_rejected() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);
    let outlet = caller.outlet("Main").await;
    let product = caller.product("Widget", 0).await;

    // Wrong sign for a sale.
    let (status, body) = caller
        .post("/movements", movement(&outlet, &product, "sale", 3))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "body={body}");

    // Unknown product.
    let unknown = posledger_core::ProductId::new().to_string();
    let (status, body) = caller
        .post("/movements", movement(&outlet, &unknown, "purchase", 3))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "body={body}");
}

#[tokio::test]
async fn transfer_with_shared_reference_completes() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);
    let a = caller.outlet("A").await;
    let b = caller.outlet("B").await;
    let product = caller.product("Widget", 0).await;

    let mut out = movement(&a, &product, "transfer_out", -10);
    out["reference_id"] = json!("X");
    out["counterpart_outlet_id"] = json!(b);
    let mut inbound = movement(&b, &product, "transfer_in", 10);
    inbound["reference_id"] = json!("X");
    inbound["counterpart_outlet_id"] = json!(a);

    assert_eq!(caller.post("/movements", out).await.0, StatusCode::CREATED);
    assert_eq!(caller.post("/movements", inbound).await.0, StatusCode::CREATED);

    let (status, report) = caller.get("/transfers").await;
    assert_eq!(status, StatusCode::OK);
    let transfers = report["transfers"].as_array().unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0]["status"], "completed");
    assert_eq!(transfers[0]["quantity"], 10);
}

#[tokio::test]
async fn second_shift_on_a_till_is_refused() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);
    let outlet = caller.outlet("Main").await;
    let till = caller.till(&outlet, "Till 7").await;

    let start = json!({ "till_id": till, "outlet_id": outlet, "opening_cash": 10000 });
    let (status, body) = caller.post("/shift/start", start.clone()).await;
    assert_eq!(status, StatusCode::CREATED, "body={body}");

    let (status, body) = caller.post("/shift/start", start).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "till_in_use");

    let (_, tills) = caller.get(&format!("/tills?outlet={outlet}")).await;
    assert_eq!(tills[0]["in_use"], true);
}

#[tokio::test]
async fn closing_a_shift_reconciles_and_streams_the_summary() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);
    let outlet = caller.outlet("Main").await;
    let till = caller.till(&outlet, "Till 1").await;

    let mut stream = caller
        .request(reqwest::Method::GET, "/shifts/summaries/stream")
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);

    let (_, shift) = caller
        .post(
            "/shift/start",
            json!({ "till_id": till, "outlet_id": outlet, "opening_cash": 100, "float": 0 }),
        )
        .await;
    let shift_id = shift["shift_id"].as_str().unwrap().to_string();

    let (status, _) = caller
        .post(&format!("/shifts/{shift_id}/cash-sales"), json!({ "amount": 250 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = caller
        .post(&format!("/shifts/{shift_id}/cash-refunds"), json!({ "amount": 20 }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, closed) = caller
        .post(
            "/shift/close",
            json!({ "shift_id": shift_id, "closing_cash": 335, "notes": "end of day" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "body={closed}");
    assert_eq!(closed["status"], "completed");
    assert_eq!(closed["reconciliation"]["expected"], 330);
    assert_eq!(closed["reconciliation"]["variance"], 5);

    let mut received = String::new();
    let read = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = stream.chunk().await.unwrap() {
            received.push_str(&String::from_utf8_lossy(&chunk));
            if received.contains("event: shift.closed") && received.contains(&shift_id) {
                break;
            }
        }
    })
    .await;
    assert!(read.is_ok(), "no summary within timeout, got: {received}");

    let (status, body) = caller
        .post(
            "/shift/close",
            json!({ "shift_id": shift_id, "closing_cash": 335 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "shift_not_running");
}

#[tokio::test]
async fn tenants_do_not_see_each_other() {
    let srv = TestServer::spawn().await;
    let first = Caller::new(&srv);
    let second = Caller::new(&srv);

    let outlet = first.outlet("Main").await;

    let (status, outlets) = second.get("/outlets").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outlets.as_array().unwrap().len(), 0);

    let (status, _) = second.get(&format!("/outlets/{outlet}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = second.post(&format!("/outlets/{outlet}/deactivate"), json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deactivated_outlet_refuses_movements() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);
    let outlet = caller.outlet("Main").await;
    let product = caller.product("Widget", 0).await;

    let (status, body) = caller
        .post(&format!("/outlets/{outlet}/deactivate"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (status, body) = caller
        .post("/movements", movement(&outlet, &product, "purchase", 5))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "outlet_inactive");
}

#[tokio::test]
async fn retired_till_disappears() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);
    let outlet = caller.outlet("Main").await;
    let till = caller.till(&outlet, "Till 3").await;

    let res = caller
        .request(reqwest::Method::DELETE, &format!("/tills/{till}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let (status, _) = caller.get(&format!("/tills/{till}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, tills) = caller.get("/tills").await;
    assert!(tills.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn bad_path_ids_are_bad_requests() {
    let srv = TestServer::spawn().await;
    let caller = Caller::new(&srv);

    let (status, body) = caller.get("/shifts/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, body) = caller.get("/stock?product=not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_parameter");
}
