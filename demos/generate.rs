use datafile_gen::generate_profiles;
use fs_extra::dir::{copy, remove, CopyOptions};
use log::{error, info};
use std::env;
use std::path::Path;

fn main() {
    env::set_var("RUST_LOG", "info");
    env_logger::init();

    // Work on a copy so the fixture folder stays untouched
    let data_dir = Path::new("output/demo-data");
    if data_dir.exists() {
        if let Err(e) = remove(data_dir) {
            error!("Failed to remove existing demo folder: {}", e);
            return;
        }
    }
    let mut options = CopyOptions::new();
    options.copy_inside = true;
    if let Err(e) = copy("tests/fixtures/data-files", data_dir, &options) {
        error!("Failed to copy folder: {}", e);
        return;
    }

    match generate_profiles(data_dir, "basic,accounts", false) {
        Ok(reports) => {
            for report in reports {
                info!(
                    "{}: {:?}",
                    report.profile_name.unwrap_or_default(),
                    report.files_written
                );
            }
        }
        Err(e) => error!("{}", e),
    }
}
