use std::time::Duration;

use http_crosswind_runner::prelude::*;

/// Ramp readers up to 50 VUs over three and a half minutes and hold the p95 read latency under
/// 400ms.
pub fn scenario(
    cli: CrosswindScenarioCli,
) -> ScenarioDefinitionBuilder<HttpRunnerContext, HttpAgentContext> {
    ScenarioDefinitionBuilder::new("steady_read", cli)
        .with_ramping_vus(
            RampingVus::new(0)
                .stage(Duration::from_secs(30), 10)
                .stage(Duration::from_secs(60), 25)
                .stage(Duration::from_secs(120), 50)
                .stage(Duration::from_secs(30), 0)
                .graceful_ramp_down(Duration::from_secs(15)),
        )
        .with_threshold("http_req_failed", "rate<0.01")
        .with_threshold("http_req_duration{scenario:steady_read}", "p(95)<400")
        .with_threshold("checks", "rate>0.95")
        .use_agent_setup(configure_client)
        .use_agent_behaviour(agent_behaviour)
}

fn agent_behaviour(ctx: &mut HttpCtx) -> HookResult {
    let config = ctx.config();
    let reads = vec![
        HttpRequest::get(config.url("/healthz")),
        HttpRequest::get(config.url("/business-hours")),
        HttpRequest::get(config.url("/appointments/today")),
        HttpRequest::get(appointments_range_url(config, 1)),
    ];

    let client = ctx.get().client()?;
    let responses = ctx.execute(async { Ok(client.batch(reads).await) })?;

    ctx.check(
        "batch 200s",
        responses.iter().all(|response| response.status() == 200),
    );
    for response in &responses {
        ctx.metrics().add_trend(
            "read_duration",
            response.timings().duration.as_secs_f64() * 1000.0,
        );
    }

    check_existing_patient(ctx)?;
    ctx.sleep(Duration::from_millis(500))
}
