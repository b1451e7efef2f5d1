//! Drive a tracker with a synthetic page and print what would be sent.
//!
//! Run with: RUST_LOG=clickstream=info cargo run --example simulated_page
//!
//! Pass a collector URL as the first argument to POST records to it instead.

use std::sync::Arc;
use std::time::Duration;

use clickstream::{
    Document, DomEvent, Environment, EventBus, EventKind, Layout, MemoryTransport, StaticHost,
    Tracker, TrackerConfig, Transport,
};

#[tokio::main]
async fn main() -> clickstream::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clickstream=info".into()),
        )
        .init();

    let mut doc = Document::new();
    let html = doc.append_element(doc.root(), "html");
    let body = doc.append_element(html, "body");
    let form = doc.append_element(body, "form");
    doc.set_attribute(form, "id", "signup");
    let email = doc.append_element(form, "input");
    doc.set_attribute(email, "name", "email");
    doc.set_attribute(email, "type", "email");
    doc.set_layout(email, Layout::new(40.0, 120.0, 320.0, 32.0));
    let submit = doc.append_element(form, "button");
    doc.set_attribute(submit, "data-cta", "signup");
    doc.set_layout(submit, Layout::new(40.0, 170.0, 120.0, 40.0));
    doc.append_text(submit, "Sign up");

    let mut env = Environment::desktop("https://example.com/signup?utm_source=newsletter");
    env.referrer = "https://mail.example.org/?button=cta".to_string();
    let host = Arc::new(StaticHost::new(env).with_document(doc));
    host.set_battery_level(0.64);

    let memory = Arc::new(MemoryTransport::new());
    let bus = EventBus::new();
    let tracker = match std::env::args().nth(1) {
        Some(endpoint) => {
            let config = TrackerConfig::default().with_endpoint(endpoint);
            let tracker = Tracker::with_http(host.clone(), config)?;
            tracker.attach(&bus);
            tracker.capture_capabilities();
            tracker
        }
        None => {
            let transport: Arc<dyn Transport> = memory.clone();
            Tracker::start(host.clone(), transport, TrackerConfig::default(), &bus)
        }
    };

    bus.dispatch(&DomEvent::click(email, 60.0, 130.0));
    bus.dispatch(&DomEvent::keydown(email, "a"));
    for x in 0..20 {
        bus.dispatch(&DomEvent::new(EventKind::Mousemove).with_target(submit).at(x as f64, 180.0));
    }
    bus.dispatch(&DomEvent::click(submit, 90.0, 190.0));
    bus.dispatch(&DomEvent::new(EventKind::Submit).with_target(form));

    host.update_environment(|env| env.href = "https://example.com/welcome".to_string());
    bus.dispatch(&DomEvent::new(EventKind::BeforeUnload));

    tokio::time::sleep(Duration::from_millis(500)).await;

    for request in memory.sent() {
        println!("{} {}", request.path, request.body);
    }
    println!(
        "left page: {}, {} record(s) captured in memory",
        tracker.session().has_left(),
        memory.sent().len()
    );
    Ok(())
}
