//! Berth command-line interface

use berth_cloud::aws::AwsProvider;
use berth_core::env::{AppDefinition, EnvironmentId, ProjectId};
use berth_orchestrator::{reaper, EnvironmentOrchestrator};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(name = "berth")]
#[command(version = berth_core::VERSION)]
#[command(about = "Berth - disposable cloud environments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Stand up (or update) an environment
    Up {
        /// Project id
        #[arg(short, long)]
        pid: String,

        /// Environment id: pr-<n> or a deployment name
        #[arg(short, long)]
        env: String,

        /// Container image to run
        #[arg(short, long)]
        image: String,

        /// Port the container listens on
        #[arg(long, default_value_t = 80)]
        port: u16,

        /// Instances to run
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Source revision tag
        #[arg(long)]
        sha: Option<String>,

        /// Hours until the environment expires (PR previews only)
        #[arg(long)]
        ttl_hours: Option<i64>,

        /// Front the environment with a load balancer
        #[arg(long)]
        load_balancer: bool,
    },

    /// Rotate a live environment onto a new app definition
    Update {
        #[arg(short, long)]
        pid: String,

        #[arg(short, long)]
        env: String,

        #[arg(short, long)]
        image: String,

        #[arg(long, default_value_t = 80)]
        port: u16,

        #[arg(long, default_value_t = 1)]
        count: u32,

        #[arg(long)]
        sha: Option<String>,
    },

    /// Tear down an environment
    Down {
        #[arg(short, long)]
        pid: String,

        #[arg(short, long)]
        env: String,
    },

    /// Show an environment or a whole project
    Status {
        #[arg(short, long)]
        pid: String,

        #[arg(short, long)]
        env: Option<String>,
    },

    /// List known projects
    Projects,

    /// List a project's open environments
    Environments {
        #[arg(short, long)]
        pid: String,
    },

    /// Destroy a project's scaffolding (requires zero open environments)
    DestroyProject {
        #[arg(short, long)]
        pid: String,
    },

    /// Run one reaper cycle now
    Reap,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let environments = build_orchestrator().await?;

    match cli.command {
        Commands::Up {
            pid,
            env,
            image,
            port,
            count,
            sha,
            ttl_hours,
            load_balancer,
        } => {
            let pid = ProjectId::new(pid)?;
            let id: EnvironmentId = env.parse()?;
            let mut app = AppDefinition::new(image, port)
                .with_desired_count(count)
                .with_load_balancer(load_balancer);
            if let Some(sha) = sha {
                app = app.with_sha(sha);
            }
            if let Some(hours) = ttl_hours {
                app = app.with_expires_at(Utc::now() + Duration::hours(hours));
            }

            println!("{}", "Provisioning environment...".bright_cyan().bold());
            let description = environments.create(&pid, &id, &app).await?;
            print_environment(&description);
        }
        Commands::Update {
            pid,
            env,
            image,
            port,
            count,
            sha,
        } => {
            let pid = ProjectId::new(pid)?;
            let id: EnvironmentId = env.parse()?;
            let mut app = AppDefinition::new(image, port).with_desired_count(count);
            if let Some(sha) = sha {
                app = app.with_sha(sha);
            }

            println!("{}", "Rotating environment...".bright_cyan().bold());
            let description = environments.update(&pid, &id, &app).await?;
            print_environment(&description);
        }
        Commands::Down { pid, env } => {
            let pid = ProjectId::new(pid)?;
            let id: EnvironmentId = env.parse()?;

            println!("{}", "Destroying environment...".bright_cyan().bold());
            let report = environments.destroy(&pid, &id).await?;
            if report.is_clean() {
                println!("{}", "Environment destroyed".green());
            } else {
                println!("{}", "Destroyed with failures:".yellow().bold());
                for failure in &report.failures {
                    println!("  {} {}", failure.step.yellow(), failure.message);
                }
            }
        }
        Commands::Status { pid, env } => {
            let pid = ProjectId::new(pid)?;
            match env {
                Some(env) => {
                    let id: EnvironmentId = env.parse()?;
                    let description = environments.describe(&pid, &id).await?;
                    print_environment(&description);
                }
                None => {
                    let project = environments.projects().describe(&pid).await?;
                    println!("{} {}", "Project:".bright_white(), project.pid);
                    println!("  {} {}", "Network:".bright_white(), project.network_id);
                    if let Some(subnet) = &project.subnet_id {
                        println!("  {} {}", "Subnet:".bright_white(), subnet);
                    }
                    if let Some(uri) = &project.repository_uri {
                        println!("  {} {}", "Repository:".bright_white(), uri);
                    }
                    for id in &project.environments {
                        println!("  {} {}", "Environment:".bright_white(), id);
                    }
                }
            }
        }
        Commands::Projects => {
            for pid in environments.projects().list().await? {
                println!("{pid}");
            }
        }
        Commands::Environments { pid } => {
            let pid = ProjectId::new(pid)?;
            for id in environments.list(&pid).await? {
                println!("{id}");
            }
        }
        Commands::DestroyProject { pid } => {
            let pid = ProjectId::new(pid)?;
            environments.projects().destroy(&pid).await?;
            println!("{}", "Project scaffolding destroyed".green());
        }
        Commands::Reap => {
            let reaped = reaper::run_cycle(&environments).await?;
            println!("Reaped {} expired environment(s)", reaped);
        }
    }

    Ok(())
}

async fn build_orchestrator() -> anyhow::Result<EnvironmentOrchestrator> {
    let config = berth_utils::Config::from_env()?;
    let provider = Arc::new(AwsProvider::new(config.cloud.clone()).await?);
    Ok(EnvironmentOrchestrator::new(
        provider,
        config.orchestrator,
        config.cloud.domain,
    ))
}

fn print_environment(description: &berth_core::env::EnvironmentDescription) {
    let state = if description.ready {
        "ready".green().bold()
    } else {
        "not ready".yellow().bold()
    };
    println!(
        "{} {} {}",
        description.pid.to_string().bright_white(),
        description.id.to_string().bright_white(),
        state
    );
    println!("  {} {}", "Cluster:".bright_white(), description.cluster);
    for instance in &description.instance_ids {
        println!("  {} {}", "Instance:".bright_white(), instance);
    }
    if let Some(ip) = &description.public_ip {
        println!("  {} {}", "Address:".bright_white(), ip);
    }
    if let Some(dns) = &description.dns_name {
        println!("  {} http://{}", "URL:".bright_white(), dns);
    }
    if let Some(expires_at) = description.expires_at {
        println!("  {} {}", "Expires:".bright_white(), expires_at);
    }
}
