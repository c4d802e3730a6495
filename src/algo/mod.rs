pub mod psrl;
pub mod rlsvi;
pub mod ucrl_vtr;

pub use psrl::PsrlAgent;
pub use rlsvi::RlsviAgent;
pub use ucrl_vtr::UcrlVtrAgent;
