use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Human-readable name of the emergency-stop combination on this platform.
#[cfg(target_os = "macos")]
pub const EMERGENCY_COMBO: &str = "Ctrl+Option+X";
#[cfg(not(target_os = "macos"))]
pub const EMERGENCY_COMBO: &str = "Ctrl+Alt+X";

/// Start a background thread that watches for the emergency-stop hotkey
/// system-wide. Sets `flag` to `true` each time the combination is pressed;
/// the host polls and clears it.
#[cfg(target_os = "macos")]
pub fn start_emergency_listener(flag: Arc<AtomicBool>) -> bool {
    use std::ffi::c_void;
    use std::sync::atomic::AtomicPtr;

    type CGEventTapProxy = *mut c_void;
    type CGEventRef = *mut c_void;
    type CFMachPortRef = *mut c_void;
    type CFRunLoopSourceRef = *mut c_void;
    type CFRunLoopRef = *mut c_void;
    type CFStringRef = *const c_void;

    type CGEventTapCallBack =
        unsafe extern "C" fn(CGEventTapProxy, u32, CGEventRef, *mut c_void) -> CGEventRef;

    const K_CG_HID_EVENT_TAP: u32 = 0;
    const K_CG_HEAD_INSERT_EVENT_TAP: u32 = 0;
    const K_CG_EVENT_TAP_OPTION_LISTEN_ONLY: u32 = 1;
    const CG_EVENT_KEY_DOWN: u32 = 10;
    const CG_EVENT_TAP_DISABLED_BY_TIMEOUT: u32 = 0xFFFF_FFFE;
    const CG_EVENT_TAP_DISABLED_BY_USER_INPUT: u32 = 0xFFFF_FFFF;
    const K_CG_KEYBOARD_EVENT_KEYCODE: u32 = 9;

    const FLAG_SHIFT: u64 = 0x0002_0000;
    const FLAG_CONTROL: u64 = 0x0004_0000;
    const FLAG_OPTION: u64 = 0x0008_0000;
    const FLAG_COMMAND: u64 = 0x0010_0000;

    const KEYCODE_X: i64 = 7;

    extern "C" {
        fn CGEventTapCreate(
            tap: u32,
            place: u32,
            options: u32,
            events_of_interest: u64,
            callback: CGEventTapCallBack,
            user_info: *mut c_void,
        ) -> CFMachPortRef;
        fn CFMachPortCreateRunLoopSource(
            allocator: *const c_void,
            port: CFMachPortRef,
            order: i64,
        ) -> CFRunLoopSourceRef;
        fn CFRunLoopGetCurrent() -> CFRunLoopRef;
        fn CFRunLoopAddSource(rl: CFRunLoopRef, source: CFRunLoopSourceRef, mode: CFStringRef);
        fn CFRunLoopRun();
        fn CGEventGetFlags(event: CGEventRef) -> u64;
        fn CGEventGetIntegerValueField(event: CGEventRef, field: u32) -> i64;
        fn CGEventTapEnable(tap: CFMachPortRef, enable: bool);

        static kCFRunLoopCommonModes: CFStringRef;
    }

    // The tap must be re-enabled from inside the callback when macOS
    // disables it, so keep it reachable.
    static TAP: AtomicPtr<c_void> = AtomicPtr::new(std::ptr::null_mut());

    unsafe extern "C" fn on_event(
        _proxy: CGEventTapProxy,
        event_type: u32,
        event: CGEventRef,
        user_info: *mut c_void,
    ) -> CGEventRef {
        unsafe {
            if event_type == CG_EVENT_TAP_DISABLED_BY_TIMEOUT
                || event_type == CG_EVENT_TAP_DISABLED_BY_USER_INPUT
            {
                let tap = TAP.load(Ordering::Acquire);
                if !tap.is_null() {
                    CGEventTapEnable(tap, true);
                }
                return event;
            }
            if event_type != CG_EVENT_KEY_DOWN {
                return event;
            }

            let flags = CGEventGetFlags(event);
            let keycode = CGEventGetIntegerValueField(event, K_CG_KEYBOARD_EVENT_KEYCODE);
            let wanted = FLAG_CONTROL | FLAG_OPTION;
            let forbidden = FLAG_COMMAND | FLAG_SHIFT;

            if keycode == KEYCODE_X && flags & wanted == wanted && flags & forbidden == 0 {
                let flag = &*(user_info as *const AtomicBool);
                flag.store(true, Ordering::Release);
            }
            event
        }
    }

    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || unsafe {
        let flag_ptr = Arc::into_raw(flag) as *mut c_void;
        let tap = CGEventTapCreate(
            K_CG_HID_EVENT_TAP,
            K_CG_HEAD_INSERT_EVENT_TAP,
            K_CG_EVENT_TAP_OPTION_LISTEN_ONLY,
            1 << CG_EVENT_KEY_DOWN,
            on_event,
            flag_ptr,
        );
        if tap.is_null() {
            crate::logger::error(
                "emergency hotkey unavailable: grant Accessibility permission to your terminal",
            );
            drop(Arc::from_raw(flag_ptr as *const AtomicBool));
            ready_tx.send(false).ok();
            return;
        }
        TAP.store(tap, Ordering::Release);

        let source = CFMachPortCreateRunLoopSource(std::ptr::null(), tap, 0);
        CFRunLoopAddSource(CFRunLoopGetCurrent(), source, kCFRunLoopCommonModes);
        CGEventTapEnable(tap, true);
        ready_tx.send(true).ok();

        CFRunLoopRun(); // blocks forever
    });

    ready_rx.recv().unwrap_or(false)
}

/// Bring the terminal that owns our process to the front.
#[cfg(target_os = "macos")]
pub fn activate_terminal() {
    let ppid = unsafe { libc::getppid() };
    let script = format!(
        "tell application \"System Events\" to set frontmost of \
         first process whose unix id is {} to true",
        ppid
    );
    std::process::Command::new("osascript")
        .arg("-e")
        .arg(&script)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .ok();
}

#[cfg(target_os = "windows")]
pub fn start_emergency_listener(flag: Arc<AtomicBool>) -> bool {
    use std::ffi::c_void;

    #[repr(C)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[repr(C)]
    struct Msg {
        hwnd: *mut c_void,
        message: u32,
        w_param: usize,
        l_param: isize,
        time: u32,
        pt: Point,
    }

    const MOD_ALT: u32 = 0x0001;
    const MOD_CONTROL: u32 = 0x0002;
    const MOD_NOREPEAT: u32 = 0x4000;
    const VK_X: u32 = 0x58;
    const WM_HOTKEY: u32 = 0x0312;
    const HOTKEY_ID: i32 = 0x0C1F;

    #[link(name = "user32")]
    extern "system" {
        fn RegisterHotKey(hwnd: *mut c_void, id: i32, modifiers: u32, vk: u32) -> i32;
        fn GetMessageW(msg: *mut Msg, hwnd: *mut c_void, min: u32, max: u32) -> i32;
    }

    // RegisterHotKey binds to the calling thread's queue, so registration
    // and the message pump both live on the listener thread.
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || unsafe {
        let ok = RegisterHotKey(
            std::ptr::null_mut(),
            HOTKEY_ID,
            MOD_CONTROL | MOD_ALT | MOD_NOREPEAT,
            VK_X,
        );
        if ok == 0 {
            crate::logger::error(
                "failed to register emergency hotkey Ctrl+Alt+X, another application may own it",
            );
            ready_tx.send(false).ok();
            return;
        }
        ready_tx.send(true).ok();

        let mut msg: Msg = std::mem::zeroed();
        while GetMessageW(&mut msg, std::ptr::null_mut(), 0, 0) > 0 {
            if msg.message == WM_HOTKEY && msg.w_param == HOTKEY_ID as usize {
                flag.store(true, Ordering::Release);
            }
        }
    });

    ready_rx.recv().unwrap_or(false)
}

/// Bring the console window that owns our process to the foreground.
#[cfg(target_os = "windows")]
pub fn activate_terminal() {
    use std::ffi::c_void;

    const SW_RESTORE: i32 = 9;

    #[link(name = "user32")]
    extern "system" {
        fn GetConsoleWindow() -> *mut c_void;
        fn SetForegroundWindow(hwnd: *mut c_void) -> i32;
        fn ShowWindow(hwnd: *mut c_void, cmd_show: i32) -> i32;
    }

    unsafe {
        let hwnd = GetConsoleWindow();
        if !hwnd.is_null() {
            ShowWindow(hwnd, SW_RESTORE);
            SetForegroundWindow(hwnd);
        }
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub fn start_emergency_listener(_flag: Arc<AtomicBool>) -> bool {
    // No system-wide hotkey here; the TUI binding still works.
    false
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub fn activate_terminal() {}

/// Consume a pending trigger.
pub fn take_trigger(flag: &AtomicBool) -> bool {
    flag.swap(false, Ordering::AcqRel)
}
