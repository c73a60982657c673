pub mod room;
pub mod user;

pub use room::{
    CreateRoomRequest, JoinRoomRequest, Participant, Room, RoomInfo, RoomStatus, UpdateStatusRequest,
    Visibility, MAX_CAPACITY, MIN_CAPACITY,
};
pub use user::Claims;
