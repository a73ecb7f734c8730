//! 规则引擎集成测试
//!
//! 测试从规则构建、存储排序到引擎执行的完整工作流。

use rule_engine::{
    ActionDescriptor, Actions, ComponentRegistry, ConditionDescriptor, Conditions,
    ExecutionContext, Package, RuleBuilder, RuleEngine, RuleStore,
};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// 注册一个按上下文路径返回布尔值的自定义条件
fn registry_with_switch() -> ComponentRegistry {
    let mut registry = ComponentRegistry::with_defaults();
    registry.register_custom_condition("switch", |ctx, desc| {
        let path = desc.option_str("path").unwrap_or("switches.default");
        Ok(ctx.get(path) == Some(Value::Bool(true)))
    });
    registry
}

/// 创建测试上下文：模拟一次 GET 请求
fn create_request_context(registry: &ComponentRegistry) -> ExecutionContext {
    let ctx = registry.new_context();
    ctx.register_provider("request", || {
        Ok(json!({
            "request": {
                "method": "GET",
                "path": "/shop/cart",
                "headers": {"user-agent": "Mozilla/5.0", "accept-language": "nl-NL"},
                "cookies": {"currency": "EUR"}
            }
        }))
    });
    ctx.register_provider("switches", || {
        Ok(json!({"switches": {"on": true, "off": false}}))
    });
    ctx
}

// ==================== 端到端场景 ====================

#[test]
fn test_all_conditions_match_runs_action() {
    let registry = Arc::new(ComponentRegistry::with_defaults());
    let ctx = create_request_context(&registry);

    let rule = RuleBuilder::new("cache-shop")
        .match_all()
        .when(
            Conditions::new()
                .request_method("GET")
                .request_url("/shop/*"),
        )
        .then(Actions::new().cache(600))
        .build();

    let report = RuleEngine::new(registry).execute(&[rule], &ctx, None);

    assert_eq!(report.stats.rules_processed, 1);
    assert_eq!(report.stats.rules_matched, 1);
    assert_eq!(report.stats.actions_executed, 1);
    assert_eq!(report.stats.rules_skipped, 0);
    assert_eq!(
        report.context["response"]["headers"]["cache-control"],
        json!("public, max-age=600")
    );
}

#[test]
fn test_missing_package_skips_rule() {
    let registry = Arc::new(ComponentRegistry::with_defaults());
    let ctx = create_request_context(&registry);

    let rule = RuleBuilder::new("shop-only")
        .requires("woocommerce")
        .then(Actions::new().block("closed"))
        .build();

    let allowed = BTreeSet::from(["core".to_string()]);
    let report = RuleEngine::new(registry).execute(&[rule], &ctx, Some(&allowed));

    assert_eq!(report.stats.rules_processed, 1);
    assert_eq!(report.stats.rules_skipped, 1);
    assert_eq!(report.stats.rules_matched, 0);
    assert_eq!(report.stats.actions_executed, 0);
    assert!(report.context.get("response").is_none());
}

#[test]
fn test_match_none_with_all_false_conditions() {
    let registry = Arc::new(registry_with_switch());
    let ctx = create_request_context(&registry);

    let rule = RuleBuilder::new("none-match")
        .match_none()
        .when(Conditions::new().add("switch", Value::Null).with("path", "switches.off"))
        .when(Conditions::new().add("switch", Value::Null).with("path", "switches.missing"))
        .then(Actions::new().set_context("result.none", true))
        .build();

    let report = RuleEngine::new(registry).execute(&[rule], &ctx, None);

    assert_eq!(report.stats.rules_matched, 1);
    assert_eq!(report.stats.actions_executed, 1);
    assert_eq!(report.context["result"]["none"], json!(true));
}

#[test]
fn test_failing_action_does_not_stop_next_action() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let mut registry = ComponentRegistry::with_defaults();
    registry.register_custom_action("explode", |_, _| anyhow::bail!("boom"));
    registry.register_custom_action("count", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let registry = Arc::new(registry);
    let ctx = registry.new_context();

    let rule = RuleBuilder::new("isolated")
        .then(
            Actions::new()
                .custom("explode", json!({}))
                .custom("count", json!({})),
        )
        .build();

    let report = RuleEngine::new(registry).execute(&[rule], &ctx, None);

    assert_eq!(report.stats.rules_matched, 1);
    assert_eq!(report.stats.actions_executed, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].key, "action:explode");
    assert!(report.errors[0].last_message.contains("boom"));
}

// ==================== 动作锁定 ====================

#[test]
fn test_action_lock_blocks_later_rules() {
    let registry = Arc::new(ComponentRegistry::with_defaults());
    let ctx = create_request_context(&registry);
    let store = RuleStore::new();

    store
        .load(
            RuleBuilder::new("short-cache")
                .order(10)
                .when(Conditions::new().request_url("/shop/*"))
                .then(Actions::new().cache(60).locked())
                .build(),
        )
        .unwrap();
    store
        .load(
            RuleBuilder::new("long-cache")
                .order(20)
                .when(Conditions::new().request_method("GET"))
                .then(
                    Actions::new()
                        .cache(86400)
                        .set_header("X-Cache-Rule", "long-cache"),
                )
                .build(),
        )
        .unwrap();

    let mut engine = RuleEngine::new(registry);
    let report = engine.execute(&store.sorted(), &ctx, None);

    assert_eq!(report.stats.rules_matched, 2);
    assert_eq!(report.stats.actions_executed, 2);
    assert_eq!(
        report.context["response"]["headers"]["cache-control"],
        json!("public, max-age=60")
    );
    assert_eq!(
        report.context["response"]["headers"]["x-cache-rule"],
        json!("long-cache")
    );
    assert_eq!(
        engine.locked_actions().get("cache").map(String::as_str),
        Some("short-cache")
    );
}

#[test]
fn test_lock_applies_even_when_later_rule_does_not_lock() {
    let registry = Arc::new(ComponentRegistry::with_defaults());
    let ctx = registry.new_context();

    let rules = vec![
        RuleBuilder::new("deny")
            .then(Actions::new().block("maintenance").locked())
            .build(),
        RuleBuilder::new("deny-again")
            .then(Actions::new().add("block", json!({"status": 451, "message": "legal"})))
            .build(),
    ];

    let report = RuleEngine::new(registry).execute(&rules, &ctx, None);

    assert_eq!(report.stats.actions_executed, 1);
    assert_eq!(report.context["response"]["status"], json!(403));
    assert_eq!(report.context["response"]["body"], json!("maintenance"));
}

// ==================== 上下文与占位符 ====================

#[test]
fn test_provider_invoked_once_across_rules() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let registry = Arc::new(ComponentRegistry::with_defaults());
    let ctx = registry.new_context();
    ctx.register_provider("request", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"request": {"method": "POST", "path": "/checkout"}}))
    });

    let rules = vec![
        RuleBuilder::new("a").when(Conditions::new().request_method("POST")).build(),
        RuleBuilder::new("b").when(Conditions::new().request_url("/checkout")).build(),
        RuleBuilder::new("c")
            .when(Conditions::new().request_header("Referer", Value::Null))
            .build(),
    ];

    let report = RuleEngine::new(registry).execute(&rules, &ctx, None);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.stats.rules_matched, 2);
    assert_eq!(report.context["request"]["method"], json!("POST"));
}

#[test]
fn test_unread_sections_absent_from_snapshot() {
    let registry = Arc::new(ComponentRegistry::with_defaults());
    let ctx = registry.new_context();
    ctx.register_provider("request", || Ok(json!({"request": {"method": "GET"}})));
    ctx.register_provider("post", || Ok(json!({"post": {"id": 1}})));

    let rule = RuleBuilder::new("get-only")
        .when(Conditions::new().request_method("GET"))
        .build();

    let report = RuleEngine::new(registry).execute(&[rule], &ctx, None);

    assert!(report.context.get("request").is_some());
    assert!(report.context.get("post").is_none());
}

#[test]
fn test_placeholders_in_actions() {
    let mut registry = ComponentRegistry::with_defaults();
    registry.register_placeholder("site", |_ctx, path| {
        Ok(match path {
            ["url"] => Some(json!("https://shop.example")),
            _ => None,
        })
    });
    let registry = Arc::new(registry);
    let ctx = create_request_context(&registry);

    let rule = RuleBuilder::new("lang-redirect")
        .when(Conditions::new().request_header("Accept-Language", "nl*"))
        .then(
            Actions::new()
                .redirect("{site.url}/nl{request.path}")
                .set_header("X-Debug", "{site.unknown} {missing.value}"),
        )
        .build();

    let report = RuleEngine::new(registry).execute(&[rule], &ctx, None);

    assert_eq!(
        report.context["response"]["redirect"],
        json!({"url": "https://shop.example/nl/shop/cart", "status": 302})
    );
    assert_eq!(
        report.context["response"]["headers"]["x-debug"],
        json!("{site.unknown} {missing.value}")
    );
}

// ==================== 错误隔离 ====================

#[test]
fn test_broken_condition_is_isolated() {
    let registry = Arc::new(registry_with_switch());
    let ctx = create_request_context(&registry);

    let rules = vec![
        RuleBuilder::new("broken")
            .match_any()
            .when(
                Conditions::new()
                    .add("does_not_exist", "x")
                    .add("switch", Value::Null)
                    .with("path", "switches.on"),
            )
            .then(Actions::new().set_context("hits.broken", 1))
            .build(),
        RuleBuilder::new("healthy")
            .when(Conditions::new().request_method("GET"))
            .then(Actions::new().set_context("hits.healthy", 1))
            .build(),
    ];

    let report = RuleEngine::new(registry).execute(&rules, &ctx, None);

    assert_eq!(report.stats.rules_matched, 2);
    assert_eq!(report.context["hits"], json!({"broken": 1, "healthy": 1}));
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].key, "condition:does_not_exist");
}

#[test]
fn test_misconfigured_action_is_noop() {
    let registry = Arc::new(ComponentRegistry::with_defaults());
    let ctx = registry.new_context();

    let rule = RuleBuilder::new("bad-redirect")
        .then(
            Actions::new()
                .add("redirect", json!({}))
                .log("redirect skipped"),
        )
        .build();

    let report = RuleEngine::new(registry).execute(&[rule], &ctx, None);

    assert_eq!(report.stats.actions_executed, 1);
    assert_eq!(report.errors[0].key, "action:redirect");
}

// ==================== 规则来源 ====================

#[test]
fn test_rules_from_json_store() {
    let registry = Arc::new(registry_with_switch());
    let ctx = create_request_context(&registry);
    let store = RuleStore::new();

    store
        .load_from_json(
            r#"{
                "id": "eur-banner",
                "order": 30,
                "conditions": [
                    {"type": "cookie", "name": "currency", "value": ["EUR", "GBP"]},
                    {"type": "request_method", "operator": "NOT IN", "value": ["POST", "PUT"], "match_type": "all"}
                ],
                "actions": [
                    {"type": "set_context", "path": "banner.currency", "value": "{request.cookies.currency}"}
                ]
            }"#,
        )
        .unwrap();
    store
        .load_from_json(
            r#"{
                "id": "disabled",
                "order": 1,
                "enabled": false,
                "actions": [{"type": "block"}]
            }"#,
        )
        .unwrap();

    let report = RuleEngine::new(registry).execute(&store.sorted(), &ctx, None);

    assert_eq!(report.stats.rules_processed, 2);
    assert_eq!(report.stats.rules_matched, 1);
    assert_eq!(report.context["banner"]["currency"], json!("EUR"));
    assert!(report.context["response"].is_null());
}

#[test]
fn test_package_dependencies_gate_rules() {
    let mut registry = ComponentRegistry::with_defaults();
    registry.register_custom_condition("cart_total", |ctx, desc| {
        let total = ctx.get("cart.total").and_then(|v| v.as_f64()).unwrap_or(0.0);
        Ok(total >= desc.value.as_f64().unwrap_or(0.0))
    });
    registry
        .register_package(Package::new("core"))
        .register_package(
            Package::new("shop")
                .depends_on("core")
                .provides_condition("cart_total"),
        );
    registry.packages_mut().load("shop").unwrap();

    let rule = RuleBuilder::new("free-shipping")
        .when(Conditions::new().custom("cart_total", 50))
        .then(Actions::new().set_context("shipping.free", true))
        .build_with(&registry)
        .unwrap();
    assert_eq!(rule.required_packages(), ["shop".to_string()]);

    let registry = Arc::new(registry);
    let ctx = registry.new_context();
    ctx.set("cart.total", json!(75));

    let mut engine = RuleEngine::new(registry);
    let report = engine.execute(std::slice::from_ref(&rule), &ctx, None);
    assert_eq!(report.stats.rules_matched, 1);
    assert_eq!(report.context["shipping"]["free"], json!(true));

    let only_core = BTreeSet::from(["core".to_string()]);
    let report = engine.execute(&[rule], &ctx, Some(&only_core));
    assert_eq!(report.stats.rules_skipped, 1);
}

#[test]
fn test_report_serializes_for_logging() {
    let registry = Arc::new(ComponentRegistry::with_defaults());
    let ctx = registry.new_context();
    let rule = RuleBuilder::new("r")
        .then(Actions::new().add("unknown_action", json!({})))
        .build();

    let report = RuleEngine::new(registry).execute(&[rule], &ctx, None);
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["rules_processed"], json!(1));
    assert_eq!(json["actions_executed"], json!(0));
    assert_eq!(json["errors"][0]["key"], json!("action:unknown_action"));
    assert_eq!(json["context"], json!({}));
}

#[test]
fn test_direct_descriptor_construction() {
    let registry = Arc::new(ComponentRegistry::with_defaults());
    let ctx = create_request_context(&registry);

    let mut rule = rule_engine::Rule::new("manual");
    rule.conditions.push(
        ConditionDescriptor::with_operator("request_header", "LIKE", "*mozilla*")
            .with("name", "User-Agent"),
    );
    rule.actions
        .push(ActionDescriptor::new("set_header").with("name", "Vary").with("value", "User-Agent"));

    let report = RuleEngine::new(registry).execute(&[rule], &ctx, None);
    assert_eq!(report.context["response"]["headers"]["vary"], json!("User-Agent"));
}
