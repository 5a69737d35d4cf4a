mod config;
mod loader;

use std::process::ExitCode;
use std::rc::Rc;

use anyhow::Context;
use clap::Parser;

use cohort_core::{service_manager_self, ActionManager, CallbackSink, NodeExecutor, Service, Status, TracingSink};
use cohort_exec::LocalNodeExecutor;

use config::Cli;

/// Everything that has to happen on the single cooperative context before
/// the run loop starts: parse the file, wire the graph into the process-wide
/// singletons, and apply the CLI-level overrides.
fn prepare(cli: &Cli) -> anyhow::Result<()> {
    let services = loader::load_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let manager = service_manager_self();
    for service in &services {
        if cli.simulate {
            Service::simulate(service, true);
        }
        if let Some(fanout) = cli.fanout {
            let actions: Vec<_> = service.borrow().actions.values().cloned().collect();
            for action in actions {
                if action.borrow().fanout.is_none() {
                    action.borrow_mut().fanout = Some(fanout);
                }
            }
        }
        manager.register(Rc::clone(service)).with_context(|| {
            format!("duplicate service name while registering '{}'", service.borrow().name)
        })?;
    }

    if cli.verify {
        manager.verify_all_commands().context("command verification failed")?;
    }

    let executor = LocalNodeExecutor::new() as Rc<dyn NodeExecutor>;
    let sink = Rc::new(TracingSink) as Rc<dyn CallbackSink>;
    let action_manager = ActionManager::new(Some(executor), sink);
    cohort_core::set_action_manager(action_manager);

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<Status> {
    prepare(&cli)?;

    let service = service_manager_self()
        .get(&cli.service)
        .ok_or_else(|| anyhow::anyhow!("no such service '{}' in {}", cli.service, cli.config.display()))?;

    Service::run(&service, &cli.action).await?;

    let action = Service::action(&service, &cli.action)
        .ok_or_else(|| anyhow::anyhow!("no such action '{}' in service '{}'", cli.action, cli.service))?;
    let status = action.borrow().status;
    Ok(status)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_filter())),
        )
        .init();

    let local = tokio::task::LocalSet::new();
    let result = local.run_until(run(cli)).await;

    match result {
        Ok(status) => {
            println!("{status}");
            if status.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
