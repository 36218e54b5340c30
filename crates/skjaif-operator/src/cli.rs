//! Command line interface of the operator binary.
//!
//! Every argument of `run` can also be provided through an environment
//! variable of the same name in upper case, eg. `WATCH_NAMESPACE`.
use std::{net::SocketAddr, time::Duration};

use clap::{Args, Parser};
use skjaif_webhook::ConversionWebhookServer;

use crate::{
    backoff::ExponentialBackoff,
    normalize::{DEFAULT_COFFEE, DEFAULT_CUP, DEFAULT_WATER, NormalizedFields},
    reconciler::{DEFAULT_MAX_CONFLICT_RETRIES, DEFAULT_MAX_TRANSIENT_RETRIES, RetryLimits},
};

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(name = "skjaif-operator", author, version, about = "Operator for SvartSkjaif resources")]
pub struct Opts {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, Parser)]
pub enum Command {
    /// Print the CustomResourceDefinition of SvartSkjaif, serving both revisions.
    Crd,

    /// Run the operator.
    Run(RunArguments),
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct RunArguments {
    /// Provides a specific namespace to watch (instead of watching all namespaces)
    #[arg(long, env, default_value = "")]
    pub watch_namespace: String,

    #[command(flatten)]
    pub normalization: NormalizationOptions,

    #[command(flatten)]
    pub retry: RetryOptions,

    #[command(flatten)]
    pub webhook: WebhookOptions,
}

impl RunArguments {
    /// The namespace to watch, or [`None`] to watch all namespaces.
    pub fn watch_namespace(&self) -> Option<String> {
        (!self.watch_namespace.is_empty()).then(|| self.watch_namespace.clone())
    }
}

#[derive(Debug, PartialEq, Eq, Args)]
#[command(next_help_heading = "Normalization Options")]
pub struct NormalizationOptions {
    /// The coffee (`kaffe`) every object is normalized to.
    #[arg(long, env, default_value = DEFAULT_COFFEE)]
    pub normalized_coffee: String,

    /// The cup (`kopp`) every object is normalized to.
    #[arg(long, env, default_value = DEFAULT_CUP)]
    pub normalized_cup: String,

    /// The water (`vann`) every object is normalized to.
    #[arg(long, env, default_value = DEFAULT_WATER)]
    pub normalized_water: String,
}

impl From<NormalizationOptions> for NormalizedFields {
    fn from(options: NormalizationOptions) -> Self {
        Self {
            coffee: options.normalized_coffee,
            cup: options.normalized_cup,
            water: options.normalized_water,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Args)]
#[command(next_help_heading = "Retry Options")]
pub struct RetryOptions {
    /// How often a write rejected because of a concurrent modification is retried.
    #[arg(long, env, default_value_t = DEFAULT_MAX_CONFLICT_RETRIES)]
    pub max_conflict_retries: u32,

    /// How often a transient store failure is retried.
    #[arg(long, env, default_value_t = DEFAULT_MAX_TRANSIENT_RETRIES)]
    pub max_transient_retries: u32,

    /// The delay before the first retry of a transient store failure, eg. `100ms`.
    #[arg(long, env, value_parser = humantime::parse_duration, default_value = "100ms")]
    pub backoff_base: Duration,

    /// The upper bound of the delay between retries, eg. `5s`.
    #[arg(long, env, value_parser = humantime::parse_duration, default_value = "5s")]
    pub backoff_max: Duration,
}

impl RetryOptions {
    pub fn limits(&self) -> RetryLimits {
        RetryLimits {
            max_conflict_retries: self.max_conflict_retries,
            max_transient_retries: self.max_transient_retries,
        }
    }

    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            base: self.backoff_base,
            max: self.backoff_max,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Args)]
#[command(next_help_heading = "Webhook Options")]
pub struct WebhookOptions {
    /// The socket address the conversion webhook listens on.
    #[arg(long, env, default_value_t = ConversionWebhookServer::DEFAULT_SOCKET_ADDRESS)]
    pub webhook_bind_address: SocketAddr,

    /// Don't serve the conversion webhook.
    #[arg(long, env)]
    pub disable_webhook: bool,
}
