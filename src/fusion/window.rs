/// `window_size` evenly spaced times spanning
/// `[end_time - window_size * period, end_time]`. The last time is exactly
/// `end_time`.
pub fn window_times(end_time: f64, window_size: usize, period: f64) -> Vec<f64> {
    match window_size {
        0 => Vec::new(),
        1 => vec![end_time],
        size => {
            let start = end_time - period * size as f64;
            let step = (end_time - start) / (size - 1) as f64;
            let mut times: Vec<f64> = (0..size - 1).map(|i| start + step * i as f64).collect();
            times.push(end_time);
            times
        }
    }
}
