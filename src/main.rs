use instanced_circles::{constants::TITLE, framework};

fn main() {
    env_logger::init();

    if let Err(err) = framework::run(TITLE) {
        log::error!("{}", err);
        std::process::exit(-1);
    }
}
