/// Format a `chrono::Duration` the same human-friendly way the teacher
/// formats connection ages in its admin/log output.
///
/// # Arguments
///
/// * `duration` - A duration of time
pub fn format_duration(duration: &chrono::Duration) -> String {
    let milliseconds = format!("{:0>3}", duration.num_milliseconds() % 1000);

    let seconds = format!("{:0>2}", duration.num_seconds() % 60);

    let minutes = format!("{:0>2}", duration.num_minutes() % 60);

    let hours = format!("{:0>2}", duration.num_hours() % 24);

    let days = duration.num_days().to_string();

    format!("{days}d {hours}:{minutes}:{seconds}.{milliseconds}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sub_minute_duration() {
        let d = chrono::Duration::milliseconds(1500);
        assert_eq!(format_duration(&d), "0d 00:00:01.500");
    }
}
