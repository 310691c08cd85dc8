use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{debug, info, warn};

use xbee_link::session::Addr;
use xbee_link::stats::StatsReporter;
use xbee_link::{KillReason, Link, LinkConfig};

use crate::cli::{RunOpts, stats_interval};
use crate::port::open_port;

pub fn run(opts: RunOpts) -> Result<()> {
    debug!("run: {:?}", opts);
    let interval = stats_interval(opts.stats)?;
    let config = LinkConfig::new(opts.robots.clone())
        .context("robot list")?
        .with_poll(opts.poll);

    let port = open_port(&opts.ser)?;
    let mut link = Link::new(port, &config).context("link setup")?;

    for robot in link.scheduler_mut().sessions_mut() {
        robot.set_velocity(0.0, 0.0, 0.0);
        robot.set_dribbler(opts.dribble);
        robot.set_kill(KillReason::Operator, !opts.enable);
    }
    if !opts.enable {
        warn!("robots held disabled; pass --enable to send RUN");
    }

    for robot in link.scheduler().sessions() {
        debug!(robot = %Addr(robot.address()), health = %robot.health(), "registered");
    }
    info!(
        dev = %opts.ser.dev,
        baud = opts.ser.baud,
        robots = config.robots.len(),
        poll = %opts.poll,
        "starting link"
    );

    let now = Instant::now();
    let mut reporter = StatsReporter::new(interval, now);
    link.start(now).context("first transmission")?;

    loop {
        link.pump().context("serial read")?;
        let now = Instant::now();
        link.process(now).context("link processing")?;
        reporter.maybe_log(now, link.stats(), link.scheduler().sessions());
    }
}
