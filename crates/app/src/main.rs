mod config;
mod http;
mod seed;

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use services::{AppServices, Clock, ReportKind};
use storage::repository::NewUserRecord;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tutor_core::model::ResearchGroup;

use crate::config::{Cli, Command, normalize_sqlite_url, prepare_sqlite_file};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err:#}");
        std::process::exit(2);
    }
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("app=info,services=info,storage=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_url = normalize_sqlite_url(&cli.db_url);
    prepare_sqlite_file(&db_url)?;
    let policy = cli.policy.to_policy()?;
    let app = AppServices::new_sqlite(&db_url, Clock::system(), policy)
        .await
        .with_context(|| format!("opening {db_url}"))?;

    match cli.command {
        Command::Serve { bind } => serve(app, bind).await,
        Command::Report { kind, out } => {
            let kind = ReportKind::from_selector(Some(kind.as_str()));
            match out {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("creating {}", path.display()))?;
                    write_report(&app, kind, &mut file).await?;
                    info!(path = %path.display(), report = %kind, "report written");
                    Ok(())
                }
                None => write_report(&app, kind, &mut tokio::io::stdout()).await,
            }
        }
        Command::CreateUser {
            username,
            staff,
            superuser,
            group,
        } => {
            let record = NewUserRecord {
                username,
                is_active: staff || superuser,
                is_staff: staff,
                is_superuser: superuser,
            };
            let accounts = app.accounts();
            let user = accounts.create_user(record).await?;
            if let Some(group) = group {
                let group: ResearchGroup = group.parse()?;
                accounts.assign_research_group(user.id, group).await?;
            }
            println!("{}", user.id);
            Ok(())
        }
        Command::Seed => seed::seed(&app).await,
    }
}

async fn serve(app: AppServices, bind: std::net::SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(%bind, "listening");
    axum::serve(listener, http::router(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn write_report<W>(app: &AppServices, kind: ReportKind, out: &mut W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut chunks = app.export(kind).await?.into_byte_stream();
    while let Some(chunk) = chunks.next().await {
        out.write_all(&chunk?).await?;
    }
    out.flush().await?;
    Ok(())
}
