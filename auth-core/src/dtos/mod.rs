pub mod auth;

pub use auth::{
    ChangePasswordRequest, LoginRequest, LoginResponse, LogoutResponse, MessageResponse,
    PasswordResetConfirm, PasswordResetRequest, RefreshRequest, RegisterRequest,
    RegisterResponse, VerifyEmailRequest,
};
