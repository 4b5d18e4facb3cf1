//! ChangeTriggeredJob operator binary.
//!
//! Runs the reconciliation controller for ChangeTriggeredJob custom
//! resources. With `--generate-crds` it prints the CRD YAML and exits.

use changejob_operator::config::ControllerConfig;
use changejob_operator::controller::{
    error_policy, ChangeTriggeredJobController, ControllerContext, ReconcileAction,
};
use changejob_operator::crd::ChangeTriggeredJob;
use clap::{Parser, ValueEnum};
use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "changejob-operator", version, about)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Shortcut for --log-level=debug
    #[arg(long)]
    debug: bool,

    /// Print the CustomResourceDefinition YAML and exit
    #[arg(long)]
    generate_crds: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    if args.generate_crds {
        println!("---");
        println!("{}", serde_yaml::to_string(&ChangeTriggeredJob::crd())?);
        return Ok(());
    }

    tracing::info!("Starting changejob operator");

    let client = Client::try_default().await?;
    tracing::info!("Connected to Kubernetes cluster");

    let config = ControllerConfig::from_env();
    tracing::info!(poll_interval = ?config.poll_interval, "Controller configured");

    let ctx = Arc::new(ControllerContext::new(client.clone(), config));
    run_controller(client, ctx).await;

    Ok(())
}

fn init_tracing(args: &Args) -> anyhow::Result<()> {
    let level = if args.debug { "debug" } else { &args.log_level };
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("changejob_operator={level}").parse()?)
        .add_directive(format!("operator={level}").parse()?)
        .add_directive("kube=info".parse()?);

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
    Ok(())
}

/// Run the ChangeTriggeredJob controller until shutdown.
async fn run_controller(client: Client, ctx: Arc<ControllerContext>) {
    tracing::info!("Starting ChangeTriggeredJob controller");

    let triggers: Api<ChangeTriggeredJob> = Api::all(client);
    let controller = ChangeTriggeredJobController::new(ctx.clone());

    Controller::new(triggers, WatcherConfig::default())
        .shutdown_on_signal()
        .run(
            move |trigger, _ctx| {
                let controller = controller.clone();
                async move {
                    match controller.reconcile(trigger).await? {
                        ReconcileAction::Requeue(duration) => Ok(Action::requeue(duration)),
                        ReconcileAction::Done => Ok(Action::await_change()),
                    }
                }
            },
            error_policy,
            ctx,
        )
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    tracing::debug!(trigger = %obj.name, ?action, "Reconciled trigger");
                }
                Err(error) => {
                    tracing::error!(error = %error, "Controller stream error");
                }
            }
        })
        .await;
}
