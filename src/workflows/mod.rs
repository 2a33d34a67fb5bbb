pub mod psychosocial;
