// src/services/portal.rs

//! Timetable portal access.
//!
//! A session is a cookie pair (locale + CAS ticket) obtained by posting the
//! cohort's credentials to the login form. Week pages are then fetched one
//! date at a time with that cookie.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::COOKIE;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{CohortConfig, PortalConfig, RawTimetable};
use crate::services::timetable::parse_timetable;
use crate::utils::http::{create_async_client, create_session_client};

/// Authenticated portal session for one cohort.
#[derive(Clone)]
pub struct PortalSession {
    pub cohort: String,
    cookie_header: String,
}

impl PortalSession {
    pub fn new(cohort: impl Into<String>, cookie_header: impl Into<String>) -> Self {
        Self {
            cohort: cohort.into(),
            cookie_header: cookie_header.into(),
        }
    }

    /// Value of the `Cookie` header sent with page requests.
    pub fn cookie_header(&self) -> &str {
        &self.cookie_header
    }
}

impl fmt::Debug for PortalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalSession")
            .field("cohort", &self.cohort)
            .finish_non_exhaustive()
    }
}

/// Source of raw timetable pages.
#[async_trait]
pub trait TimetableSource: Send + Sync {
    /// Authenticate a cohort and return its session.
    async fn open_session(&self, cohort: &CohortConfig) -> Result<PortalSession>;

    /// Fetch and extract the week page containing `date`.
    async fn fetch_week(&self, session: &PortalSession, date: NaiveDate) -> Result<RawTimetable>;
}

/// Client for the Wigor timetable portal.
pub struct WigorPortal {
    config: PortalConfig,
    client: Client,
}

impl WigorPortal {
    pub fn new(config: &PortalConfig) -> Result<Self> {
        let client = create_async_client(&config.user_agent, config.timeout_secs)?;
        Ok(Self {
            config: config.clone(),
            client,
        })
    }

    fn base_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.config.base_url)?)
    }

    fn login_url(&self) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}?action=posEDTLMS&serverID=C",
            self.config.base_url
        ))?)
    }

    /// Week page URL; the portal expects an unencoded `MM/dd/yyyy` date.
    fn week_url(&self, date: NaiveDate) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}?action=posEDTLMS&date={}",
            self.config.base_url,
            date.format("%m/%d/%Y")
        ))?)
    }

    /// `name=value` pair of the ticket cookie held by `jar`, if any.
    fn find_ticket(&self, jar: &Jar, url: &Url) -> Option<String> {
        let cookies = jar.cookies(url)?;
        let cookies = cookies.to_str().ok()?;
        let prefix = format!("{}=", self.config.ticket_cookie);
        cookies
            .split(';')
            .map(str::trim)
            .find(|pair| pair.starts_with(&prefix) && pair.len() > prefix.len())
            .map(str::to_string)
    }
}

#[async_trait]
impl TimetableSource for WigorPortal {
    async fn open_session(&self, cohort: &CohortConfig) -> Result<PortalSession> {
        let base_url = self.base_url()?;
        let jar = Arc::new(Jar::default());
        jar.add_cookie_str(&self.config.locale_cookie, &base_url);
        let client = create_session_client(&self.config, Arc::clone(&jar))?;

        let form = [
            ("username", cohort.username.as_str()),
            ("password", cohort.password.as_str()),
            ("_eventId", "submit"),
            ("execution", self.config.execution_token.as_str()),
        ];

        // The CAS handshake may end in a redirect loop or an error page once
        // the ticket is set; only the presence of the ticket matters.
        match client.post(self.login_url()?).form(&form).send().await {
            Ok(response) => log::debug!(
                "Login for {} finished with status {}",
                cohort.name,
                response.status()
            ),
            Err(e) if e.is_redirect() || e.is_status() => {
                log::debug!("Login for {} ended with: {}", cohort.name, e)
            }
            Err(e) => return Err(AppError::authentication(&cohort.name, e)),
        }

        let ticket = self.find_ticket(&jar, &base_url).ok_or_else(|| {
            AppError::authentication(&cohort.name, "ticket cookie not issued by the portal")
        })?;

        log::info!("Authenticated cohort {}", cohort.name);
        Ok(PortalSession::new(
            &cohort.name,
            format!("{}; {}", self.config.locale_cookie, ticket),
        ))
    }

    async fn fetch_week(&self, session: &PortalSession, date: NaiveDate) -> Result<RawTimetable> {
        let context = format!("{} week of {}", session.cohort, date);
        let html = self
            .client
            .get(self.week_url(date)?)
            .header(COOKIE, session.cookie_header())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::fetch(&context, e))?
            .text()
            .await
            .map_err(|e| AppError::fetch(&context, e))?;

        parse_timetable(&html)
    }
}
