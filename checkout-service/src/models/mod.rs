pub mod cart;
pub mod order;
pub mod payment;
pub mod reservation;

pub use cart::{CartItem, CartItemPatch, SelectedOption};
pub use order::{CheckoutOrder, CheckoutRecord, CheckoutState};
pub use payment::{
    ApprovedPayment, PaymentApprovalResult, PaymentAuthorization, PaymentFailure,
    CALLBACK_ERROR_CODE,
};
pub use reservation::{ParticipantBounds, Reservation, ReservationStatus};
