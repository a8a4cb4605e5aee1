pub mod arm_pose;
pub mod calibration;
pub mod config;
pub mod console_display;
pub mod control;
pub mod coordinator;
pub mod error;
pub mod exercise;
pub mod landmark_reader;
pub mod notes;
pub mod osc_sender;
pub mod pipeline;
pub mod press_detector;
pub mod recorder;
pub mod region;
pub mod scheduler;
pub mod simulator;
pub mod types;
