pub mod ebb_connection;
pub mod motion_planner;
pub mod plotter_hal_ebb;
pub mod port_discovery;
