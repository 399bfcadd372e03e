use std::time::Duration;

use http_crosswind_runner::prelude::*;

/// One VU for 30 seconds, checking that each read endpoint answers with a 200.
pub fn scenario(
    cli: CrosswindScenarioCli,
) -> ScenarioDefinitionBuilder<HttpRunnerContext, HttpAgentContext> {
    ScenarioDefinitionBuilder::new("smoke", cli)
        .with_constant_vus(1, Duration::from_secs(30))
        .with_threshold("http_req_failed", "rate<0.01")
        .with_threshold("checks", "rate>0.99")
        .use_agent_setup(configure_client)
        .use_agent_behaviour(agent_behaviour)
}

fn agent_behaviour(ctx: &mut HttpCtx) -> HookResult {
    let config = ctx.config();
    let reads = [
        ("health 200", config.url("/healthz")),
        ("business-hours 200", config.url("/business-hours")),
        ("today 200", config.url("/appointments/today")),
        ("range 200", appointments_range_url(config, 3)),
    ];

    let client = ctx.get().client()?;
    for (check, url) in reads {
        let response = ctx.execute(async { Ok(client.get(url).await) })?;
        if !ctx.check(check, response.status() == 200) {
            log::debug!("{check} failed with status {}", response.status());
        }
    }

    check_existing_patient(ctx)?;
    ctx.sleep(Duration::from_secs(1))
}
