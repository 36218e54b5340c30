use std::sync::Arc;

use clap::Parser;
use skjaif_crd::SchemaRegistry;
use skjaif_operator::{
    cli::{Command, Opts, RunArguments},
    controller, logging,
    reconciler::{Cancellation, Reconciler},
    signal,
    store::KubeStore,
};
use skjaif_webhook::{
    ConversionGateway, ConversionWebhookError, ConversionWebhookOptions, ConversionWebhookServer,
};
use snafu::{ResultExt, Snafu};

const APP_NAME: &str = "skjaif-operator";
const LOG_ENV: &str = "SKJAIF_OPERATOR_LOG";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitializeLogging { source: logging::Error },

    #[snafu(display("failed to print CustomResourceDefinition"))]
    PrintCrd { source: skjaif_crd::crd::Error },

    #[snafu(display("failed to create Kubernetes client"))]
    CreateClient { source: kube::Error },

    #[snafu(display("failed to watch for shutdown signals"))]
    WatchShutdownSignals { source: signal::SignalError },

    #[snafu(display("failed to run conversion webhook"))]
    RunWebhook { source: ConversionWebhookError },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let opts = Opts::parse();

    match opts.command {
        Command::Crd => skjaif_crd::crd::print_yaml_schema().context(PrintCrdSnafu),
        Command::Run(arguments) => {
            logging::initialize_logging(LOG_ENV, APP_NAME).context(InitializeLoggingSnafu)?;
            tracing::info!(
                app.name = APP_NAME,
                app.version = env!("CARGO_PKG_VERSION"),
                "starting operator"
            );

            run(arguments).await
        }
    }
}

async fn run(arguments: RunArguments) -> Result<(), Error> {
    let watch_namespace = arguments.watch_namespace();
    let RunArguments {
        normalization,
        retry,
        webhook,
        ..
    } = arguments;

    let cancellation = Cancellation::new();
    signal::cancel_on_shutdown_signal(cancellation.clone()).context(WatchShutdownSignalsSnafu)?;

    let client = kube::Client::try_default()
        .await
        .context(CreateClientSnafu)?;
    let registry = Arc::new(SchemaRegistry::new());
    let store = Arc::new(KubeStore::new(client, watch_namespace));

    let reconciler = Reconciler::new(store, Arc::clone(&registry))
        .with_normalized(normalization.into())
        .with_retry_limits(retry.limits())
        .with_backoff(retry.backoff());
    tracing::info!(normalized = ?reconciler.normalized(), "normalizing SvartSkjaif objects");

    let controller = controller::run(controller::Context {
        reconciler,
        cancellation: cancellation.clone(),
    });

    if webhook.disable_webhook {
        tracing::info!("conversion webhook disabled");
        controller.await;
        return Ok(());
    }

    let server = ConversionWebhookServer::new(
        ConversionGateway::new(registry),
        ConversionWebhookOptions {
            socket_addr: webhook.webhook_bind_address,
        },
    );
    let webhook = async {
        let result = server.run(cancellation.cancelled()).await;
        // Without the webhook the API server cannot serve v1alpha1 anymore
        if result.is_err() {
            cancellation.cancel();
        }
        result
    };

    let ((), webhook) = tokio::join!(controller, webhook);
    webhook.context(RunWebhookSnafu)
}
