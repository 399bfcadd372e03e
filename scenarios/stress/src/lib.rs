use std::time::Duration;

use http_crosswind_runner::prelude::*;

/// Push the arrival rate from 10 to 200 iterations per second and back down, to find where the
/// service starts to fail.
pub fn scenario(
    cli: CrosswindScenarioCli,
) -> ScenarioDefinitionBuilder<HttpRunnerContext, HttpAgentContext> {
    ScenarioDefinitionBuilder::new("spike", cli)
        .with_ramping_arrival_rate(
            RampingArrivalRate::new(10)
                .time_unit(Duration::from_secs(1))
                .pre_allocated_vus(50)
                .max_vus(200)
                .stage(Duration::from_secs(30), 50)
                .stage(Duration::from_secs(60), 100)
                .stage(Duration::from_secs(60), 150)
                .stage(Duration::from_secs(60), 200)
                .stage(Duration::from_secs(30), 0),
        )
        // Looser than the load scenario, some failures are expected at the top of the spike.
        .with_threshold("http_req_failed", "rate<0.05")
        .with_threshold("http_req_duration", "p(95)<1000")
        .with_threshold("checks", "rate>0.90")
        .use_agent_setup(configure_client)
        .use_agent_behaviour(agent_behaviour)
}

fn agent_behaviour(ctx: &mut HttpCtx) -> HookResult {
    let config = ctx.config();
    let health_url = config.url("/healthz");
    let business_hours_url = config.url("/business-hours");
    let appointments_url = appointments_range_url(config, 1);

    let client = ctx.get().client()?;
    let (health, business_hours, appointments) = ctx.execute(async {
        let health = client.get(health_url).await;
        let business_hours = client.get(business_hours_url).await;
        let appointments = client.get(appointments_url).await;
        Ok((health, business_hours, appointments))
    })?;

    ctx.check("health 200", health.status() == 200);
    ctx.check("bh 200", business_hours.status() == 200);
    ctx.check("appts 200", appointments.status() == 200);

    ctx.sleep(Duration::from_millis(200))
}
