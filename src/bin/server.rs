use clap::{App, Arg};
use pulsebridge::bridge::{self, FrontendSender};
use pulsebridge::config::{self, ServerConfig};
use pulsebridge::registry::{self, Registry};
use pulsebridge::router::Router;
use pulsebridge::sim::{self, SimManager};
use pulsebridge::{net, sweep};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CONTROL_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let matches = App::new("pulsebridge-server")
        .version("0.1.0")
        .about("TCP bridge between heart-rate wearables and consumer apps")
        .arg(
            Arg::with_name("ip-wearable")
                .long("ip-wearable")
                .value_name("IP")
                .help("Bind address for the wearable listener")
                .takes_value(true)
                .default_value(config::DEFAULT_WEARABLE_IP),
        )
        .arg(
            Arg::with_name("port-wearable")
                .long("port-wearable")
                .value_name("PORT")
                .help("Port for the wearable listener")
                .takes_value(true)
                .default_value("53397"),
        )
        .arg(
            Arg::with_name("ip-app")
                .long("ip-app")
                .value_name("IP")
                .help("Bind address for the app listeners")
                .takes_value(true)
                .default_value(config::DEFAULT_APP_IP),
        )
        .arg(
            Arg::with_name("port-app")
                .long("port-app")
                .value_name("PORT")
                .help("Port for the app egress listener")
                .takes_value(true)
                .default_value("43397"),
        )
        .arg(
            Arg::with_name("simulated")
                .short("d")
                .long("simulated")
                .help("Enable the simulated wearable subsystem"),
        )
        .get_matches();

    let server_config = match ServerConfig::from_args(
        matches.value_of("ip-wearable").unwrap_or_default(),
        matches.value_of("port-wearable").unwrap_or_default(),
        matches.value_of("ip-app").unwrap_or_default(),
        matches.value_of("port-app").unwrap_or_default(),
        matches.is_present("simulated"),
    ) {
        Ok(server_config) => server_config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return Err(err.into());
        }
    };

    let presets = registry::load_color_presets(&server_config.preset_path);
    let registry = Arc::new(Registry::new(presets));
    let root = CancellationToken::new();

    let sims = server_config
        .simulated_enabled
        .then(|| Arc::new(SimManager::new()));
    let router = Arc::new(Router::new(Arc::clone(&registry), sims.clone()));

    // Bind everything up front so misconfiguration fails before any task
    // starts.
    let wearable_listener = TcpListener::bind(server_config.wearable_bind).await?;
    let app_egress_listener = TcpListener::bind(server_config.app_egress_bind).await?;
    let app_ingress_listener = TcpListener::bind(server_config.app_ingress_bind).await?;
    info!(
        wearable = %server_config.wearable_bind,
        app_egress = %server_config.app_egress_bind,
        app_ingress = %server_config.app_ingress_bind,
        "listeners bound"
    );

    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(sweep::run(
        Arc::clone(&registry),
        root.child_token(),
    )));

    {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(net::serve(
            "wearable",
            wearable_listener,
            root.child_token(),
            move |stream, ip, cancel| {
                net::wearable::handle_wearable(stream, ip, Arc::clone(&registry), cancel)
            },
        )));
    }
    {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(net::serve(
            "app-egress",
            app_egress_listener,
            root.child_token(),
            move |stream, ip, cancel| {
                net::app::handle_app_egress(stream, ip, Arc::clone(&registry), cancel)
            },
        )));
    }
    {
        let router = Arc::clone(&router);
        tasks.push(tokio::spawn(net::serve(
            "app-ingress",
            app_ingress_listener,
            root.child_token(),
            move |stream, ip, cancel| {
                net::app::handle_app_ingress(stream, ip, Arc::clone(&router), cancel)
            },
        )));
    }

    let sender = FrontendSender::new(
        server_config.frontend_data_url.clone(),
        server_config.frontend_sim_url.clone(),
        server_config.bridge_timeout,
    )?;
    tasks.push(tokio::spawn(bridge::run_push_loop(
        sender,
        Arc::clone(&registry),
        sims.clone(),
        root.child_token(),
    )));

    if let Some(sims) = &sims {
        info!("simulated wearable subsystem enabled");
        tasks.push(tokio::spawn(sim::run_sample_pump(
            Arc::clone(sims),
            Arc::clone(&registry),
            root.child_token(),
        )));

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        tasks.push(tokio::spawn(bridge::run_control_handler(
            control_rx,
            Arc::clone(sims),
            Arc::clone(&registry),
            root.clone(),
        )));
        let control_bind = server_config.control_bind;
        let control_cancel = root.child_token();
        tasks.push(tokio::spawn(async move {
            if let Err(err) = bridge::run_control_listener(control_bind, control_tx, control_cancel).await
            {
                error!(error = %err, "control listener failed");
            }
        }));
    }

    info!("server running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    root.cancel();
    for task in tasks {
        let _ = task.await;
    }
    info!("shutdown complete");
    Ok(())
}
