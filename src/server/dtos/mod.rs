pub mod health_dto;
pub mod subtitle_dto;
