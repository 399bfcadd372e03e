use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use crosswind_runner::prelude::{AgentContext, HookResult, RunConfig};
use http_client_instrumented::prelude::{HttpClient, HttpRequest};
use rand::Rng;
use serde_json::json;

use crate::context::HttpAgentContext;
use crate::runner_context::HttpRunnerContext;

/// Password used by [login_or_register] when none is configured.
pub const DEFAULT_PASSWORD: &str = "TestPass123!";

pub type HttpCtx = AgentContext<HttpRunnerContext, HttpAgentContext>;

/// Agent setup hook that creates the VU's [HttpClient], using the configured request timeout and
/// recording into the scenario's metrics.
///
/// ```rust
/// use http_crosswind_runner::prelude::*;
///
/// fn agent_behaviour(ctx: &mut HttpCtx) -> HookResult {
///     let url = ctx.config().url("/healthz");
///     let client = ctx.get().client()?;
///     let response = ctx.execute(async { Ok(client.get(url).await) })?;
///     ctx.check("health 200", response.status() == 200);
///     Ok(())
/// }
///
/// # fn scenario(cli: CrosswindScenarioCli) -> ScenarioDefinitionBuilder<HttpRunnerContext, HttpAgentContext> {
/// ScenarioDefinitionBuilder::new("health", cli)
///     .use_agent_setup(configure_client)
///     .use_agent_behaviour(agent_behaviour)
/// # }
/// ```
pub fn configure_client(ctx: &mut HttpCtx) -> HookResult {
    let client = HttpClient::new(ctx.metrics().clone(), ctx.config().request_timeout())?;
    ctx.get_mut().client = Some(client);
    Ok(())
}

/// Mark `request` as sending JSON and attach the bearer token, if there is one.
pub fn json_headers(request: HttpRequest, token: Option<&str>) -> HttpRequest {
    let request = request.with_header("Content-Type", "application/json");
    match token {
        Some(token) => request.with_bearer(token),
        None => request,
    }
}

/// A random integer in `min..=max`.
pub fn random_int(min: i64, max: i64) -> i64 {
    rand::thread_rng().gen_range(min..=max)
}

/// Register a user, which may conflict with an existing one, then log in.
///
/// The configured username and password are used when set, otherwise a random `testuser_<n>` with
/// [DEFAULT_PASSWORD]. The login is checked as `login 200` and the token and user from the
/// response are stored in the [HttpAgentContext]. Returns the token.
pub fn login_or_register(ctx: &mut HttpCtx) -> anyhow::Result<Option<String>> {
    let username = match ctx.config().username() {
        Some(username) => username.to_string(),
        None => format!("testuser_{}", random_int(0, 999_999)),
    };
    let password = ctx
        .config()
        .password()
        .unwrap_or(DEFAULT_PASSWORD)
        .to_string();
    let email = format!("{username}@example.com");

    let register_url = ctx.config().url("/register");
    let login_url = ctx.config().url("/login");
    let client = ctx.get().client()?;
    let login = ctx.execute(async {
        // A conflict just means the user already exists.
        let register = client
            .request(
                HttpRequest::post(register_url)
                    .with_json(json!({ "username": username, "email": email, "password": password })),
            )
            .await;
        log::debug!("Register {username} returned {}", register.status());

        Ok(client
            .request(
                HttpRequest::post(login_url)
                    .with_json(json!({ "username": username, "password": password })),
            )
            .await)
    })?;

    ctx.check("login 200", login.status() == 200);
    let body = login.json();
    let token = body.str_field("token").map(str::to_string);
    let user = body.field("user").cloned();

    let values = ctx.get_mut();
    values.token = token.clone();
    values.user = user;
    Ok(token)
}

/// Search patients with a broad query and return the `id` of the first match, if there is one.
pub fn pick_existing_patient_id(ctx: &HttpCtx) -> anyhow::Result<Option<String>> {
    let url = patient_search_url(ctx.config(), "a");
    let client = ctx.get().client()?;
    let response = ctx.execute(async { Ok(client.get(url).await) })?;

    if response.status() != 200 {
        return Ok(None);
    }
    Ok(response.json().first_id())
}

/// Fetch a patient found by [pick_existing_patient_id], if there is one, and check `patient 200|404`.
pub fn check_existing_patient(ctx: &HttpCtx) -> HookResult {
    let Some(id) = pick_existing_patient_id(ctx)? else {
        return Ok(());
    };
    let url = ctx.config().url(&format!("/patients/{id}"));
    let client = ctx.get().client()?;
    let response = ctx.execute(async {
        Ok(client
            .request(HttpRequest::get(url).with_name("/patients/:id"))
            .await)
    })?;
    ctx.check(
        "patient 200|404",
        matches!(response.status(), 200 | 404),
    );
    Ok(())
}

/// Format a timestamp as RFC 3339 in UTC with millisecond precision, like `2024-05-01T09:30:00.000Z`.
pub fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The appointments listing from `days` ago until `days` from now.
pub fn appointments_range_url(config: &RunConfig, days: i64) -> String {
    let now = Utc::now();
    appointments_between_url(
        config,
        now - ChronoDuration::days(days),
        now + ChronoDuration::days(days),
    )
}

pub fn appointments_between_url(
    config: &RunConfig,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("start_time", &rfc3339(start))
        .append_pair("end_time", &rfc3339(end))
        .finish();
    format!("{}?{query}", config.url("/appointments"))
}

pub fn patient_search_url(config: &RunConfig, q: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("q", q)
        .finish();
    format!("{}?{query}", config.url("/patients/search"))
}
