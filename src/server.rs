use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use hyper::service::service_fn;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto::Builder as HyperBuilder, graceful::GracefulShutdown},
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::{
    chat::{ChatAssistant, ChatModel},
    cli::CommandArguments,
    error::{ServiceError, ServiceResult},
    handler,
    integrations::{
        news::NewsClient,
        openai::{OpenAiClient, OpenAiConfig},
        prayer::{self, PrayerClient, PrayerDay, Timetable},
        run_blocking,
        sheets::SheetsClient,
    },
    pollers,
    retrieval::{Embedder, Retriever},
    storage::Store,
    stores::{
        AnnouncementState, AssetState, CountdownState, DashboardState, DocumentState, EventState,
        StaffState,
    },
    types::StaffData,
};

/// Connections still open this long after shutdown begins are dropped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Everything a request handler or poller can reach.
pub struct AppState {
    pub settings: CommandArguments,
    pub offset: FixedOffset,
    pub staff: Mutex<Store<StaffState>>,
    pub announcements: Mutex<Store<AnnouncementState>>,
    pub events: Mutex<Store<EventState>>,
    pub assets: Mutex<Store<AssetState>>,
    pub documents: Mutex<Store<DocumentState>>,
    pub countdowns: Mutex<Store<CountdownState>>,
    pub dashboard: Mutex<Store<DashboardState>>,
    pub retriever: Retriever,
    pub assistant: ChatAssistant,
    pub roster: Option<SheetsClient>,
    pub news: NewsClient,
    pub prayer: PrayerClient,
    prayer_days: RwLock<Vec<PrayerDay>>,
}

impl AppState {
    /// Open every store and wire the OpenAI client when a key is configured.
    pub fn open(settings: CommandArguments) -> ServiceResult<Self> {
        let openai = settings
            .openai_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .map(|api_key| {
                Arc::new(OpenAiClient::new(OpenAiConfig {
                    base_url: settings.openai_base_url.clone(),
                    api_key,
                    chat_model: settings.openai_model.clone(),
                    embedding_model: settings.embedding_model.clone(),
                }))
            });
        match &openai {
            Some(client) => tracing::info!(model = client.chat_model(), "OpenAI chat enabled"),
            None => tracing::warn!("OPENAI_API_KEY is not set; chat and document indexing are disabled"),
        }
        let embedder = openai.clone().map(|c| c as Arc<dyn Embedder>);
        let model = openai.map(|c| c as Arc<dyn ChatModel>);
        Self::with_backends(settings, embedder, model)
    }

    pub fn with_backends(
        settings: CommandArguments,
        embedder: Option<Arc<dyn Embedder>>,
        model: Option<Arc<dyn ChatModel>>,
    ) -> ServiceResult<Self> {
        settings.validate().map_err(ServiceError::Config)?;
        let dir = settings.data_dir.clone();
        let retriever = Retriever::new(Store::open(&dir)?, embedder);
        let assistant = ChatAssistant::new(retriever.clone(), model);

        let roster = match (&settings.google_sheet_id, &settings.google_api_key) {
            (Some(id), Some(key)) if !id.trim().is_empty() && !key.trim().is_empty() => Some(
                SheetsClient::new(id.clone(), key.clone(), settings.google_sheet_range.clone()),
            ),
            _ => None,
        };

        Ok(Self {
            offset: settings.utc_offset(),
            staff: Mutex::new(Store::open(&dir)?),
            announcements: Mutex::new(Store::open(&dir)?),
            events: Mutex::new(Store::open(&dir)?),
            assets: Mutex::new(Store::open(&dir)?),
            documents: Mutex::new(Store::open(&dir)?),
            countdowns: Mutex::new(Store::open(&dir)?),
            dashboard: Mutex::new(Store::open(&dir)?),
            retriever,
            assistant,
            roster,
            news: NewsClient::new(settings.news_feed_url.clone())?,
            prayer: PrayerClient::new(settings.prayer_zone.clone()),
            prayer_days: RwLock::new(Vec::new()),
            settings,
        })
    }

    fn sheets(&self) -> ServiceResult<SheetsClient> {
        self.roster
            .clone()
            .ok_or_else(|| ServiceError::Config("Google Sheets roster is not configured".to_string()))
    }

    pub async fn fetch_roster(&self) -> ServiceResult<Vec<StaffData>> {
        let client = self.sheets()?;
        let offset = self.offset;
        run_blocking(move || client.fetch_roster(&offset)).await
    }

    /// Pull the roster and replace the persisted staff list with it.
    pub async fn refresh_roster(&self) -> ServiceResult<usize> {
        let rows = self.fetch_roster().await?;
        let mut staff = self.staff.lock().await;
        let count = staff
            .update_async(|s| Ok::<_, ServiceError>(s.replace_from_roster(&rows)))
            .await?;
        tracing::info!(staff = count, rows = rows.len(), "roster refreshed");
        Ok(count)
    }

    pub async fn refresh_prayer_days(&self) -> ServiceResult<usize> {
        let client = self.prayer.clone();
        let days = run_blocking(move || client.fetch_month()).await?;
        let count = days.len();
        *self.prayer_days.write().await = days;
        tracing::info!(zone = self.prayer.zone(), days = count, "prayer timetable refreshed");
        Ok(count)
    }

    /// Today's timetable, fetching the month first when the cache does not
    /// cover today.
    pub async fn prayer_timetable(&self, now: DateTime<Utc>) -> ServiceResult<Timetable> {
        let local = now.with_timezone(&self.offset);
        let (today, clock) = (local.date_naive(), local.time());
        let key = prayer::day_key(today);
        let cached = self
            .prayer_days
            .read()
            .await
            .iter()
            .any(|d| d.date.eq_ignore_ascii_case(&key));
        if !cached {
            self.refresh_prayer_days().await?;
        }
        let days = self.prayer_days.read().await;
        prayer::timetable(self.prayer.zone(), &days, today, clock)
    }

    #[cfg(test)]
    pub(crate) async fn seed_prayer_days(&self, days: Vec<PrayerDay>) {
        *self.prayer_days.write().await = days;
    }
}

pub async fn start_server(args: CommandArguments) -> ServiceResult<()> {
    let addr = args.socket_addr().map_err(ServiceError::Config)?;
    let state = Arc::new(AppState::open(args)?);

    let live: Vec<String> = {
        let documents = state.documents.lock().await;
        documents.list_documents().iter().map(|d| d.id.clone()).collect()
    };
    state.retriever.prune(&live).await?;

    let token = CancellationToken::new();
    let mut pollers = pollers::spawn(state.clone(), token.clone());

    let shutdown = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received, shutting down");
                shutdown.cancel();
            }
            Err(err) => tracing::error!("unable to listen for Ctrl-C: {err}"),
        }
    });

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServiceError::Config(format!("HTTP listen error on {addr}: {e}")))?;
    tracing::info!(%addr, data_dir = %state.settings.data_dir.display(), "display backend listening");

    let builder = HyperBuilder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!("HTTP accept error: {err}");
                        continue;
                    }
                };
                let state = state.clone();
                let service = service_fn(move |req| {
                    let state = state.clone();
                    async move { Ok::<_, Infallible>(handler::handle(state, req).await) }
                });
                let conn = builder.serve_connection(TokioIo::new(stream), service);
                let conn = graceful.watch(conn.into_owned());
                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        tracing::debug!(%peer, "HTTP connection error: {err}");
                    }
                });
            }
            _ = token.cancelled() => break,
        }
    }

    drop(listener);
    tokio::select! {
        _ = graceful.shutdown() => tracing::info!("all connections closed"),
        _ = tokio::time::sleep(SHUTDOWN_GRACE) => tracing::warn!("timed out waiting for connections to close"),
    }
    while let Some(res) = pollers.join_next().await {
        if let Err(err) = res {
            tracing::warn!("poller join error: {err}");
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::retrieval::testing::KeywordEmbedder;
    use crate::storage::temp_data_dir;

    pub fn settings() -> CommandArguments {
        CommandArguments {
            data_dir: temp_data_dir(),
            ..CommandArguments::default_settings()
        }
    }

    pub fn state_with(model: Option<Arc<dyn ChatModel>>) -> Arc<AppState> {
        let embedder: Arc<dyn Embedder> =
            Arc::new(KeywordEmbedder::new(&["printer", "wifi", "vpn"]));
        Arc::new(AppState::with_backends(settings(), Some(embedder), model).unwrap())
    }
}
