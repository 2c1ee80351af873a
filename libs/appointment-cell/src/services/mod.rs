pub mod backend;
pub mod booking;
pub mod formatting;

pub use backend::{AppointmentBackend, HospitalAppointmentBackend};
pub use booking::BookingConflictHandler;
pub use formatting::{
    format_date_for_api, map_patient_type, parse_api_date, parse_slot_date_time,
    shift_from_time, slot_query_from_params,
};
