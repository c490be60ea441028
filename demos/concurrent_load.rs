use rapidlog::{fields, Logger, LoggerConfig, NoopSink, Preset};
use std::thread;
use std::time::Instant;

fn main() -> Result<(), rapidlog::ConfigError> {
    let threads: u64 = 8;
    let per_thread: u64 = 50_000;

    for preset in [Preset::LowMemory, Preset::Balanced, Preset::Throughput] {
        let logger = Logger::new(LoggerConfig::preset(preset), NoopSink)?;
        let start = Instant::now();

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let logger = logger.clone();
                thread::spawn(move || {
                    for i in 0..per_thread {
                        logger.info("load test event", fields!["thread" => t, "iteration" => i]);
                    }
                })
            })
            .collect();
        for h in handles {
            let _ = h.join();
        }
        let produced = start.elapsed();
        logger.close();
        let total = start.elapsed();

        let stats = logger.stats();
        println!(
            "{preset}: {} records in {:?} (~{:.0} rec/s), closed after {:?}, written {}, dropped {}, peak queue {}",
            threads * per_thread,
            produced,
            (threads * per_thread) as f64 / produced.as_secs_f64(),
            total,
            stats.records_written,
            stats.records_dropped,
            logger.queue_high_water(),
        );
    }
    Ok(())
}
