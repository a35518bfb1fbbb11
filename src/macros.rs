/// Runs `$fn` and logs how long it took, tagged with `$msg` so repeated
/// measurements are easy to tell apart in the log.
///
/// Logs at `Debug` unless a `log::Level` is passed as the third argument.
///
/// # Example
///
/// ```no run
/// # fn main {
///     let image = measure_time!("fetch image", || fetcher.fetch(url))?;
///     measure_time!("load batch", || load(), log::Level::Info);
/// #}
#[macro_export]
macro_rules! measure_time {
    ($msg: expr, $fn: expr) => {
        $crate::measure_time!($msg, $fn, log::Level::Debug)
    };
    ($msg: expr, $fn: expr, $level: expr) => {{
        let instant = std::time::Instant::now();
        let res = $fn();
        log::log!(
            $level,
            "Finished \"{}\" in {} ms",
            $msg,
            instant.elapsed().as_millis(),
        );
        res
    }};
}
