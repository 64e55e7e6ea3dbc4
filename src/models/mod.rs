//! Model wrappers for Open Model Zoo networks
//!
//! Each wrapper pairs the base [`Model`](crate::engine::Model) with a decoder
//! that turns raw outputs into typed results and knows how to draw them.

pub mod age_gender;
pub mod detection;
pub mod emotions;
pub mod face_detection;
pub mod facial_landmarks;
pub mod gaze;
pub mod head_pose;
pub mod human_pose;
pub mod person_detection;
pub mod text_recognition;
pub mod vehicle_attributes;

pub use age_gender::{AgeGender, AgeGenderResult, Gender};
pub use detection::Detection;
pub use emotions::{Emotion, EmotionalState, Emotions};
pub use face_detection::FaceDetection;
pub use facial_landmarks::{EyeRegions, FaceLandmarks, FacialLandmarks, LandmarkModel};
pub use gaze::{GazeEstimation, GazeVector};
pub use head_pose::{HeadPoseAngles, HeadPoseEstimation};
pub use human_pose::{HumanPoseEstimation, Keypoint, Pose};
pub use person_detection::PersonDetection;
pub use text_recognition::{RecognizedText, TextRecognition};
pub use vehicle_attributes::{VehicleAttributes, VehicleAttributesResult};
