use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use opsboard::{
    Dashboard, DashboardConfig, FaultFilters, FilterMap, FilterSet, OperationFilters,
    PaginatedStore, store::Resource,
};
use std::fmt::Debug;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "opsboard")]
#[command(about = "Command-line view of the operations dashboard backend")]
struct Cli {
    /// JSON config file; overrides the defaults below
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "http://localhost:3000/api")]
    base_url: String,

    /// Where the session token is kept between invocations
    #[arg(long, global = true, default_value = ".opsboard-token.json")]
    token_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct PageArgs {
    #[arg(long, default_value_t = 1)]
    page: u32,
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    search: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    Login {
        #[arg(long)]
        token: String,
    },
    Logout,
    Operations {
        #[command(flatten)]
        paging: PageArgs,
        #[arg(long)]
        area: Option<String>,
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    Faults {
        #[command(flatten)]
        paging: PageArgs,
        #[arg(long = "type")]
        kind: Option<String>,
        #[arg(long)]
        worker: Option<String>,
    },
    Users {
        #[command(flatten)]
        paging: PageArgs,
        #[arg(long)]
        role: Option<String>,
    },
    Workers {
        /// Only list active workers
        #[arg(long)]
        active: bool,
    },
    Areas,
    Clients,
    Services,
    Health,
}

fn load_config(cli: &Cli) -> Result<DashboardConfig> {
    let config = match &cli.config {
        Some(path) => DashboardConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => DashboardConfig::new(&cli.base_url),
    };
    let config = match config.token_path {
        Some(_) => config,
        None => config.token_path(cli.token_file.clone()),
    };
    // One-shot invocations have no use for background prefetch.
    Ok(config.prefetch(false))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let dashboard = Dashboard::connect(config).await?;

    match cli.command {
        Command::Login { token } => {
            dashboard.login(&token).await?;
            println!("Logged in");
            Ok(())
        }
        Command::Logout => {
            dashboard.logout().await?;
            println!("Logged out");
            Ok(())
        }
        Command::Operations {
            paging,
            area,
            client,
            from,
            to,
        } => {
            require_session(&dashboard)?;
            let mut filters = OperationFilters {
                status: paging.status.clone(),
                search: paging.search.clone(),
                ..OperationFilters::default()
            };
            if let Some(area) = area {
                filters = filters.area(area);
            }
            if let Some(client) = client {
                filters = filters.client(client);
            }
            filters.start_date = from;
            filters.end_date = to;
            show_page(dashboard.operations(), filters, &paging).await
        }
        Command::Faults {
            paging,
            kind,
            worker,
        } => {
            require_session(&dashboard)?;
            let filters = FaultFilters {
                status: paging.status.clone(),
                kind,
                worker_id: worker.map(Into::into),
                search: paging.search.clone(),
                ..FaultFilters::default()
            };
            show_page(dashboard.faults(), filters, &paging).await
        }
        Command::Users { paging, role } => {
            require_session(&dashboard)?;
            let mut filters = FilterMap::new();
            if let Some(status) = &paging.status {
                filters.insert("status", status);
            }
            if let Some(search) = &paging.search {
                filters.insert("search", search);
            }
            if let Some(role) = role {
                filters.insert("role", role);
            }
            show_page(dashboard.users(), filters, &paging).await
        }
        Command::Workers { active } => {
            require_session(&dashboard)?;
            dashboard.workers().load(false).await?;
            let workers = if active {
                dashboard.workers().active_workers()
            } else {
                dashboard.workers().workers()
            };
            for worker in &workers {
                println!("{}\t{}\t{}", worker.id, worker.name, worker.status.as_str());
            }
            println!("{} workers", workers.len());
            Ok(())
        }
        Command::Areas => {
            require_session(&dashboard)?;
            for area in dashboard.reference().areas().await? {
                println!("{}\t{}\t{}", area.id, area.name, area.status.as_str());
            }
            Ok(())
        }
        Command::Clients => {
            require_session(&dashboard)?;
            for client in dashboard.reference().clients().await? {
                println!("{}\t{}\t{}", client.id, client.name, client.status.as_str());
            }
            Ok(())
        }
        Command::Services => {
            require_session(&dashboard)?;
            for service in dashboard.reference().services().await? {
                println!("{}\t{}\t{}", service.id, service.name, service.status.as_str());
            }
            Ok(())
        }
        Command::Health => {
            let check = dashboard.reference().areas().await;
            match check {
                Ok(_) => println!("Backend reachable"),
                Err(err) => println!("Backend check failed: {}", err),
            }
            println!(
                "Degraded: {} ({} consecutive failures)",
                dashboard.is_degraded(),
                dashboard.health().consecutive_failures()
            );
            Ok(())
        }
    }
}

fn require_session(dashboard: &Dashboard) -> Result<()> {
    if dashboard.is_authenticated() {
        Ok(())
    } else {
        Err(anyhow!("Not logged in; run `opsboard login --token <TOKEN>` first"))
    }
}

async fn show_page<R>(store: &PaginatedStore<R>, filters: R::Filters, paging: &PageArgs) -> Result<()>
where
    R: Resource,
    R::Item: Debug,
{
    if let Some(limit) = paging.limit {
        store.set_items_per_page(limit).await?;
    }
    if !filters.is_empty() {
        store.set_filters(filters).await?;
    } else {
        store.ensure_initial_load().await?;
    }
    if paging.page != store.current_page()? {
        store.set_page(paging.page).await?;
    }

    let state = store.snapshot()?;
    for item in &state.items {
        println!("{:?}", item);
    }
    println!(
        "Page {}/{} ({} total)",
        state.current_page, state.total_pages, state.total_items
    );
    for (name, count) in &state.aux_counts {
        println!("  {}: {}", name, count);
    }
    Ok(())
}
