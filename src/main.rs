use anyhow::Result;
use bytes::Bytes;
use clap::Parser;
use hyper::StatusCode;
use hyper::header::{self, HeaderName, HeaderValue};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use trellis::{
    App, Component, FragmentSpec, HookOutcome, Markup, PageDescriptor, PageOutput, Rendered,
    TrellisConfig, hook, sequence,
};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Serves the trellis demo site", long_about = None)]
struct Cli {
    /// Project root holding Trellis.toml
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Overrides `server.port`
    #[arg(long)]
    port: Option<u16>,

    /// Forces dev mode on
    #[arg(long)]
    dev: bool,
}

const SITE_LAYOUT: &str = r#"<header>
<nav><a href="/">Home</a> <a href="/about">About</a> <a href="/hello/trellis">Hello</a> <a href="/old-about">Old about</a></nav>
<trellis-island component="/__trellis__/client/islands/counter.js" trigger="visible" props='{"start":0}'></trellis-island>
</header>
<main><trellis-slot></trellis-slot></main>"#;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = TrellisConfig::load(&cli.root)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.dev {
        config.dev.enabled = true;
    }
    trellis::telemetry::init(&config.log_level);

    let mut app = App::from_config(&config).await?;
    register_routes(&mut app);

    trellis::server::run(Arc::new(app), &config.address(), config.server.max_body_bytes).await
}

fn register_routes(app: &mut App) {
    let layout: Arc<dyn Component> = Arc::new(
        Markup::new("site-layout", SITE_LAYOUT)
            .with_head(r#"<meta name="description" content="trellis demo">"#),
    );
    let home: Arc<dyn Component> = Arc::new(
        Markup::new("home", "<h1>Home</h1><p>Rendered at request {{request}}.</p>")
            .with_head("<title>Home</title>"),
    );
    let about: Arc<dyn Component> = Arc::new(
        Markup::new("about", "<h1>About</h1><script>console.log('about page script');</script>")
            .with_head("<title>About</title>"),
    );
    let greeting: Arc<dyn Component> = Arc::new(trellis::FnComponent::new(
        "greeting",
        |props, _ctx| {
            let name = props["name"].as_str().unwrap_or("stranger");
            Ok(Rendered::body(format!("<h1>Hello, {name}!</h1>"))
                .with_head(format!("<title>Hello {name}</title>")))
        },
    ));

    let requests = Arc::new(AtomicU64::new(0));

    {
        let layout = layout.clone();
        let requests = requests.clone();
        app.page("/", move |_event| {
            let page = PageDescriptor::new(
                FragmentSpec::new(home.clone())
                    .with_props(json!({ "request": requests.fetch_add(1, Ordering::Relaxed) })),
            )
            .with_layout(FragmentSpec::new(layout.clone()));
            Box::pin(async move { Ok(Some(page.into())) })
        });
    }
    {
        let layout = layout.clone();
        app.page("/about", move |_event| {
            let page = PageDescriptor::new(FragmentSpec::new(about.clone()))
                .with_layout(FragmentSpec::new(layout.clone()));
            Box::pin(async move { Ok(Some(page.into())) })
        });
    }
    app.page("/hello/:name", move |event| {
        let name = event.param("name").unwrap_or_default().to_string();
        let page = PageDescriptor::new(
            FragmentSpec::new(greeting.clone()).with_props(json!({ "name": name })),
        )
        .with_layout(FragmentSpec::new(layout.clone()));
        Box::pin(async move { Ok(Some(page.into())) })
    });
    app.page("/old-about", |event| {
        Box::pin(async move {
            event.redirect("/about", Some(StatusCode::MOVED_PERMANENTLY))?;
            Ok(None)
        })
    });
    app.page("/raw", |_event| {
        Box::pin(async {
            Ok(Some(PageOutput::Html {
                head: "<title>Raw</title>".to_string(),
                body: "<p>Pre-rendered markup without layouts.</p>".to_string(),
            }))
        })
    });

    app.get("/api/count", move |event| {
        let count = requests.load(Ordering::Relaxed);
        Box::pin(async move {
            event.set_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(Some(Bytes::from(serde_json::to_vec(&json!({ "count": count }))?)))
        })
    });

    app.hook(sequence([
        hook(|event| {
            Box::pin(async move {
                event.set_header(
                    HeaderName::from_static("x-powered-by"),
                    HeaderValue::from_static("trellis"),
                );
                Ok(HookOutcome::Continue)
            })
        }),
        hook(|event| {
            Box::pin(async move {
                if event.url.path().starts_with("/admin") {
                    event.status = StatusCode::FORBIDDEN;
                    return Ok(HookOutcome::Respond(event.respond("Forbidden")));
                }
                Ok(HookOutcome::Continue)
            })
        }),
    ]));
}
