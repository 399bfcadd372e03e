use std::time::Duration;

use http_crosswind_runner::prelude::*;

/// A single pass of probes that check the service fails safely on hostile input.
///
/// None of these set thresholds, the checks in the summary are the result.
pub fn scenario(
    cli: CrosswindScenarioCli,
) -> ScenarioDefinitionBuilder<HttpRunnerContext, HttpAgentContext> {
    ScenarioDefinitionBuilder::new("security_probes", cli)
        .with_constant_vus(1, Duration::from_secs(600))
        .with_iterations(1)
        .use_agent_setup(configure_client)
        .use_agent_behaviour(agent_behaviour)
}

fn agent_behaviour(ctx: &mut HttpCtx) -> HookResult {
    let config = ctx.config();
    let client = ctx.get().client()?;

    let cors = HttpRequest::options(patient_search_url(config, "a"))
        .with_header("Origin", "https://malicious.example")
        .with_header("Access-Control-Request-Method", "GET")
        .with_header("Access-Control-Request-Headers", "Authorization, Content-Type");
    let cors = ctx.execute(async { Ok(client.request(cors).await) })?;
    ctx.check(
        "cors status 204|200|4xx",
        matches!(cors.status(), 200 | 204 | 400 | 403),
    );

    let sqli_url = patient_search_url(config, "a' OR '1'='1");
    let sqli = ctx.execute(async { Ok(client.get(sqli_url).await) })?;
    ctx.check("sqli not 500", sqli.status() < 500);

    let xss_url = patient_search_url(config, "<script>alert(1)</script>");
    let xss = ctx.execute(async { Ok(client.get(xss_url).await) })?;
    ctx.check("xss not 500", xss.status() < 500);

    match pick_existing_patient_id(ctx)? {
        Some(id) => {
            let request = HttpRequest::get(config.url(&format!("/patients/{id}")))
                .with_name("/patients/:id");
            let patient = ctx.execute(async { Ok(client.request(request).await) })?;
            ctx.check(
                "patients/:id 2xx|404|401",
                matches!(patient.status(), 200 | 401 | 403 | 404),
            );
        }
        None => log::info!("No patient found, skipping the unauthenticated patient probe"),
    }

    let invalid_token = json_headers(
        HttpRequest::get(config.url("/appointments/today")),
        Some("invalid.token.here"),
    );
    let invalid_token = ctx.execute(async { Ok(client.request(invalid_token).await) })?;
    ctx.check("invalid token not 2xx", invalid_token.status() >= 400);

    Ok(())
}
